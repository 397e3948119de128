mod operation;

pub use operation::{EtlApp, EtlOperation};
