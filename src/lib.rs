//! # sparkstate - Sparkplug-style telemetry client state engine
//!
//! Decodes compact typed telemetry payloads from a multiplexed frame stream
//! and maintains an in-memory hierarchical model of the publishing entities:
//! groups → nodes → devices → metrics.
//!
//! ## Key Features
//!
//! - **Typed payload codec**: ~20 primitive and composite value types in a
//!   protobuf-compatible tagged binary envelope
//! - **Frame demultiplexer**: any number of length-prefixed frames per raw
//!   socket message, resilient to per-frame errors
//! - **Pure state engine**: birth/update/death reduction with structural
//!   sharing, so change detection is a pointer comparison
//! - **De-duplicated subscriptions**: slice observers fire only when their
//!   slice actually changed
//!
//! ## Quick Start
//!
//! ```rust
//! use sparkstate::{decode_payload, encode_payload, DataType, Metric, Payload, TypedValue};
//!
//! let payload = Payload {
//!     metrics: Some(vec![Metric::new(
//!         "Temperature",
//!         DataType::Double,
//!         TypedValue::Double(21.5),
//!     )]),
//!     ..Default::default()
//! };
//!
//! let bytes = encode_payload(&payload).unwrap();
//! let decoded = decode_payload(&bytes).unwrap();
//! assert_eq!(decoded.metrics.unwrap()[0].value, TypedValue::Double(21.5));
//! ```
//!
//! ## Modules
//!
//! - [`datatype`]: The type registry (tag ⇄ [`DataType`])
//! - [`value`]: Payload data model
//! - [`wire`]: Low-level wire primitives (varints, field keys, records)
//! - [`encoder`]: Payload encoding
//! - [`decoder`]: Payload decoding
//! - [`framing`]: Frame demultiplexer
//! - [`state`]: Pure snapshot reducer
//! - [`store`]: Subscription layer
//! - [`client`]: Host client (transport seam + reconnect state machine)

// Modules
pub mod client;
pub mod datatype;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod framing;
pub mod state;
pub mod store;
pub mod value;
pub mod wire;

// Re-exports for convenient access
pub use client::{
    ConnectionState, HostClient, MemoryTransport, Transport, RECONNECT_TIME,
};
pub use datatype::DataType;
pub use decoder::decode_payload;
pub use encoder::encode_payload;
pub use error::{
    DecodeError, EncodeError, FrameError, Result, SparkError, TransportError,
};
pub use framing::{Frame, FrameIter, FrameKind};
pub use state::{
    reduce, Device, DeviceMap, Event, GroupMap, MetricMap, Node, NodeMap, Path, PublisherState,
    Snapshot,
};
pub use store::{split_metric_tiers, MetricTiers, Store, Subscription};
pub use value::{
    DataSet, MetaData, Metric, Parameter, Payload, PropertySet, PropertySetList, PropertyValue,
    Template, TypedValue,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_basic_roundtrip() {
        let payload = Payload {
            seq: Some(7),
            metrics: Some(vec![Metric::new(
                "Pressure",
                DataType::Float,
                TypedValue::Float(1.25),
            )]),
            ..Default::default()
        };

        let bytes = encode_payload(&payload).unwrap();
        let decoded = decode_payload(&bytes).unwrap();
        assert_eq!(decoded.seq, Some(7));
        assert_eq!(
            decoded.metrics.unwrap()[0].value,
            TypedValue::Float(1.25)
        );
    }
}
