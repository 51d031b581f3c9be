//! Azure cloud provider backends.

pub mod key_vault;
