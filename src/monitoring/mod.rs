pub mod metrics;
pub mod sampler;
pub mod source;

pub use metrics::{ResourceUsage, UsageDelta, UsageTotals};
pub use sampler::{Sampler, SamplerSummary};
pub use source::{available_cores, FixedSource, PowerModel, RawDraw, SampleSource, SyntheticSource};
