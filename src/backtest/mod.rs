//! Historical replay: candle and option-quote files, the simulated surface
//! and the driver

pub mod candles;
pub mod quotes;
pub mod replay;
pub mod surface;

pub use candles::{filter_window, load_candles};
pub use quotes::{load_option_quotes, OptionQuote, OptionQuotes};
pub use replay::{ReplayDriver, ReplayReport};
pub use surface::{SimFill, SimulatedSurface};
