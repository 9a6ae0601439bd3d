// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators consumed by the
// analyzer suite and the level calculator.  Every public function returns
// `Option<T>` or an empty series so callers are forced to handle
// insufficient-data and numerical-edge-case scenarios.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod roc;
