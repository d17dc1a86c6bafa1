//! Partner adapters and their registration hooks.

use std::sync::Arc;

use crate::auction::adapter::BidderAdapter;
use crate::settings::Settings;

pub mod inmobi;
pub mod mobilefuse;

type AdapterBuilder = fn(&Settings) -> Vec<Arc<dyn BidderAdapter>>;

pub(crate) fn adapter_builders() -> &'static [AdapterBuilder] {
    &[inmobi::register, mobilefuse::register]
}
