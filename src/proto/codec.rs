//! Wire framing shared by all three dialects: a u32 big-endian length
//! prefix followed by the protobuf-encoded message.

use tokio_util::codec::LengthDelimitedCodec;

pub fn frame_codec(max_frame_bytes: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_type::<u32>()
        .big_endian()
        .max_frame_length(max_frame_bytes)
        .new_codec()
}
