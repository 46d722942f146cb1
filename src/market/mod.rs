// =============================================================================
// Market module — price series, anomaly checks and the data collaborator
// =============================================================================

pub mod detector;
pub mod series;
pub mod source;
pub mod symbols;
pub mod yahoo;

pub use detector::{CheckOutcome, DetectorConfig, MarketAnomalyDetector, MarketScan, PriceReaction};
pub use series::{PriceBar, PriceSeries, SyntheticBaseline};
pub use source::{DataOrigin, FetchOutcome, FetchPolicy, MarketDataService, MarketDataSource};
pub use symbols::{is_well_known, quick_check, resolve_alias, SymbolCheck, SymbolVerdict};
pub use yahoo::YahooChartClient;
