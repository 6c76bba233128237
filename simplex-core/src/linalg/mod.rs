//! Sparse linear algebra for the basis inverse.
//!
//! [`vector::SparseVector`] is the hybrid dense/indexed work vector used for
//! every FTRAN/BTRAN/PRICE operand; [`factor::Factor`] maintains the LU
//! factorisation of the basis with product-form updates.

pub mod factor;
pub mod vector;
