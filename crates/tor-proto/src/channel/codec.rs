//! Adapts [`tor_cell::chancell::codec::ChannelCodec`] (which works directly
//! on a `BytesMut` buffer) to [`tokio_util::codec`]'s `Encoder`/`Decoder`
//! traits, so the link connection can be driven as a `tokio_util::Framed`
//! stream once the link version is negotiated.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tor_cell::chancell::codec::ChannelCodec;
use tor_cell::chancell::msg::AnyChanMsg;
use tor_cell::chancell::AnyChanCell;

use crate::err::Error;

/// A [`tokio_util::codec`] wrapper around [`ChannelCodec`].
pub struct TokioChannelCodec(ChannelCodec);

impl TokioChannelCodec {
    /// Build a codec for the given negotiated link protocol version.
    pub fn new(link_version: u16) -> Self {
        TokioChannelCodec(ChannelCodec::new(link_version))
    }
}

impl Decoder for TokioChannelCodec {
    type Item = AnyChanCell;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.0.decode_cell::<AnyChanMsg>(src)?)
    }
}

impl Encoder<AnyChanCell> for TokioChannelCodec {
    type Error = Error;

    fn encode(&mut self, item: AnyChanCell, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.0.write_cell(item, dst)?;
        Ok(())
    }
}
