//! Numerical and performance monitoring.
//!
//! Keeps the running operation densities that steer the PRICE mode and the
//! CHUZR candidate cutoff, the synthetic tick that triggers reinversion,
//! pivot-verification statistics, and the costly-DSE counters behind the
//! steepest-edge-to-Devex switch. All output is gated by the runtime
//! logger, never by build flags.

use crate::matrix::{PriceMode, COL_PRICE_DENSITY};
use crate::problem::PriceStrategy;

/// Multiplier for running-average density updates.
const RUNNING_AVERAGE_MU: f64 = 0.05;

/// Reinvert when accumulated ticks pass this multiple of the build cost.
const SYNTHETIC_CLOCK_MULTIPLIER: f64 = 1.5;

/// An iteration's DSE work is costly above this measure.
const COSTLY_DSE_MEASURE_LIMIT: f64 = 1000.0;

/// ... and only when the DSE FTRAN result is at least this dense.
const COSTLY_DSE_MIN_DENSITY: f64 = 0.01;

/// Fraction of iterations that must be costly to switch to Devex.
const COSTLY_DSE_FREQUENCY_LIMIT: f64 = 0.05;

/// Fraction of the model size the iteration count must pass first.
const COSTLY_DSE_MIN_PROGRESS: f64 = 0.1;

/// Hysteresis: switch back to row PRICE below this fraction of the
/// column-switch density.
const ROW_PRICE_HYSTERESIS: f64 = 0.5;

/// Ultra PRICE pays off below this pivotal-row density.
const ULTRA_PRICE_DENSITY: f64 = 0.01;

/// Running densities, tick and recovery statistics.
#[derive(Debug, Clone)]
pub struct NumericMonitor {
    /// Running density of FTRAN results (the pivotal column)
    pub col_density: f64,

    /// Running density of BTRAN results (ρ)
    pub row_ep_density: f64,

    /// Running density of PRICE results (the pivotal row)
    pub row_ap_density: f64,

    /// Running density of FTRAN-DSE results
    pub dse_density: f64,

    /// Synthetic ticks accumulated since the last INVERT
    pub total_synthetic_tick: f64,

    /// Pivot verifications that disagreed
    pub num_verify_mismatch: usize,

    /// Iterations whose DSE FTRAN dominated the work
    pub num_costly_dse: usize,

    /// Iterations observed
    pub num_iterations: usize,

    /// Whether column-wise PRICE is currently in effect (hysteretic)
    col_price_active: bool,
}

impl Default for NumericMonitor {
    fn default() -> Self {
        NumericMonitor {
            col_density: 1.0,
            row_ep_density: 1.0,
            row_ap_density: 1.0,
            dse_density: 1.0,
            total_synthetic_tick: 0.0,
            num_verify_mismatch: 0,
            num_costly_dse: 0,
            num_iterations: 0,
            col_price_active: false,
        }
    }
}

impl NumericMonitor {
    /// Fresh monitor.
    pub fn new() -> Self {
        NumericMonitor::default()
    }

    fn roll(average: &mut f64, observed: f64) {
        *average = (1.0 - RUNNING_AVERAGE_MU) * *average + RUNNING_AVERAGE_MU * observed;
    }

    /// Record the density of a pivotal-column FTRAN result.
    pub fn record_col_density(&mut self, density: f64) {
        Self::roll(&mut self.col_density, density);
    }

    /// Record the density of a BTRAN result.
    pub fn record_row_ep_density(&mut self, density: f64) {
        Self::roll(&mut self.row_ep_density, density);
    }

    /// Record the density of a PRICE result.
    pub fn record_row_ap_density(&mut self, density: f64) {
        Self::roll(&mut self.row_ap_density, density);
    }

    /// Record the density of an FTRAN-DSE result.
    pub fn record_dse_density(&mut self, density: f64) {
        Self::roll(&mut self.dse_density, density);
    }

    /// Accumulate estimated work.
    pub fn add_tick(&mut self, tick: f64) {
        self.total_synthetic_tick += tick;
    }

    /// Reset the clock after an INVERT.
    pub fn reset_tick(&mut self) {
        self.total_synthetic_tick = 0.0;
    }

    /// Whether accumulated work since the last INVERT exceeds the cost of
    /// a fresh one.
    pub fn synthetic_clock_due(&self, build_tick: f64) -> bool {
        build_tick > 0.0 && self.total_synthetic_tick > SYNTHETIC_CLOCK_MULTIPLIER * build_tick
    }

    /// Record one iteration; flags it costly when the DSE FTRAN dwarfed
    /// the rest of the pipeline.
    pub fn record_iteration(&mut self, dse_in_use: bool) {
        self.num_iterations += 1;
        if dse_in_use {
            let basis_work = (self.col_density * self.row_ep_density).max(f64::MIN_POSITIVE);
            let measure = self.dse_density / basis_work;
            if measure > COSTLY_DSE_MEASURE_LIMIT && self.dse_density > COSTLY_DSE_MIN_DENSITY {
                self.num_costly_dse += 1;
            }
        }
    }

    /// The costly-DSE heuristic: enough iterations seen, and too many of
    /// them costly.
    pub fn should_switch_to_devex(&self, num_tot: usize) -> bool {
        self.num_iterations as f64 > COSTLY_DSE_MIN_PROGRESS * num_tot as f64
            && self.num_costly_dse as f64
                > COSTLY_DSE_FREQUENCY_LIMIT * self.num_iterations as f64
    }

    /// Pick the PRICE mode for a pivotal row of the given ρ density.
    pub fn select_price_mode(&mut self, strategy: PriceStrategy, rho_density: f64) -> PriceMode {
        match strategy {
            PriceStrategy::Col => PriceMode::Col,
            PriceStrategy::Row => PriceMode::Row,
            PriceStrategy::RowUltra => {
                if rho_density < ULTRA_PRICE_DENSITY {
                    PriceMode::Ultra
                } else {
                    PriceMode::Row
                }
            }
            PriceStrategy::RowSwitch => {
                if rho_density >= COL_PRICE_DENSITY {
                    PriceMode::Col
                } else {
                    PriceMode::Row
                }
            }
            PriceStrategy::RowSwitchColSwitch => {
                // Hysteretic: switch on the running mean, not one spike.
                if self.col_price_active {
                    if self.row_ep_density < ROW_PRICE_HYSTERESIS * COL_PRICE_DENSITY {
                        self.col_price_active = false;
                    }
                } else if self.row_ep_density >= COL_PRICE_DENSITY {
                    self.col_price_active = true;
                }
                if self.col_price_active {
                    PriceMode::Col
                } else {
                    PriceMode::Row
                }
            }
        }
    }
}
