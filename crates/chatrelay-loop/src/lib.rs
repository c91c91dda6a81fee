pub mod aggregator;
pub mod config;
pub mod sink;
pub mod title;
pub mod turn;

pub use aggregator::{AggregateError, AggregateOutcome, StreamAggregator};
pub use config::TurnConfig;
pub use sink::{close_sinks, BufferSink, ChannelSink, FragmentSink, SinkClosed, SinkMessage};
pub use title::TitleGenerator;
pub use turn::{TurnOutcome, TurnRequest, TurnRunner};
