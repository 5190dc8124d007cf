//! Individual preprocessing steps

pub mod grayscale;
