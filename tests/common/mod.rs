pub mod test_helpers;

#[allow(unused_imports)]
pub use test_helpers::*;
