pub use idgate_common::{Error, Result};

idgate_common::impl_context!();
