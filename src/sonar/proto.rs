//! Protobuf envelope schema carried inside RIP2 datagrams.
//!
//! Equivalent `.proto` definition:
//!
//! ```text
//! message Packet {
//!   google.protobuf.Any msg = 1;
//! }
//!
//! message Header {
//!   google.protobuf.Timestamp timestamp = 1;
//!   uint32 sequence_id = 2;
//! }
//!
//! message RangeImage {
//!   Header header = 1;
//!   uint32 width = 2;
//!   uint32 height = 3;
//!   float fov_horizontal = 4;   // degrees
//!   float fov_vertical = 5;     // degrees
//!   float image_pixel_scale = 6; // meters per sample unit
//!   repeated uint32 image_pixel_data = 7;
//! }
//! ```
//!
//! Messages are declared with `prost` derives directly so the crate builds
//! without `protoc`.

/// Fully qualified name used in `Any.type_url`
pub const RANGE_IMAGE_TYPE_NAME: &str = "waterlinked.sonar.protocol.RangeImage";

/// Type URL prefix for packed messages
pub const TYPE_URL_PREFIX: &str = "type.googleapis.com/";

/// Top-level envelope
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Packet {
    #[prost(message, optional, tag = "1")]
    pub msg: ::core::option::Option<::prost_types::Any>,
}

/// Per-message header
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Header {
    #[prost(message, optional, tag = "1")]
    pub timestamp: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(uint32, tag = "2")]
    pub sequence_id: u32,
}

/// Angular range image
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RangeImage {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<Header>,
    #[prost(uint32, tag = "2")]
    pub width: u32,
    #[prost(uint32, tag = "3")]
    pub height: u32,
    #[prost(float, tag = "4")]
    pub fov_horizontal: f32,
    #[prost(float, tag = "5")]
    pub fov_vertical: f32,
    #[prost(float, tag = "6")]
    pub image_pixel_scale: f32,
    #[prost(uint32, repeated, tag = "7")]
    pub image_pixel_data: ::prost::alloc::vec::Vec<u32>,
}

/// Whether a type URL names the range image message.
///
/// Matches on the last path segment's final component, so any package
/// prefix is accepted but `RangeImageSettings` is not.
pub fn is_range_image_type(type_url: &str) -> bool {
    let full_name = type_url.rsplit('/').next().unwrap_or(type_url);
    let short_name = full_name.rsplit('.').next().unwrap_or(full_name);
    short_name == "RangeImage"
}
