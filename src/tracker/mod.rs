pub mod aggregator;
pub mod controller;
pub mod sampler;
pub mod state;

pub use aggregator::{MotionAggregator, MotionTotals};
pub use controller::SessionController;
pub use sampler::{ChannelFixSource, FixSource, LocationSampler, SamplerEvent, SamplerOptions};
pub use state::{SessionSnapshot, TrackerStatus};
