//! Encode and decode channel cells.

use bytes::BytesMut;
use tor_bytes::Writer;

use super::{ChanCell, ChanCmd, ChanMsg, CircId, CELL_DATA_LEN};
use crate::{Error, Result};

/// Stateful encoder/decoder for the link protocol's cell stream.
///
/// Holds nothing but the negotiated link version, because (for the versions
/// this core supports, ≥ 4) that only ever affects the width of the circuit
/// ID, which is already fixed at 4 bytes everywhere in this implementation.
pub struct ChannelCodec {
    /// The negotiated link protocol version, kept for diagnostics.
    link_version: u16,
}

impl ChannelCodec {
    /// Construct a codec for the given negotiated link version.
    pub fn new(link_version: u16) -> Self {
        ChannelCodec { link_version }
    }

    /// Return the link version this codec was built with.
    pub fn link_version(&self) -> u16 {
        self.link_version
    }

    /// Encode `cell` onto `dst`, using the fixed or variable-length frame
    /// as appropriate for its command.
    pub fn write_cell<M: ChanMsg>(&mut self, cell: ChanCell<M>, dst: &mut BytesMut) -> Result<()> {
        let (circid, msg) = cell.into_circid_and_msg();
        let cmd = msg.cmd();
        dst.write_u32(CircId::get_or_zero(circid));
        dst.write_u8(cmd.into());
        let len_pos = dst.len();

        if cmd.is_var_cell() {
            dst.write_u16(0);
            msg.encode_onto(dst)?;
            let len = dst.len() - len_pos - 2;
            if len > u16::MAX as usize {
                return Err(Error::CantEncode("variable cell body too long"));
            }
            dst[len_pos..len_pos + 2].copy_from_slice(&(len as u16).to_be_bytes());
        } else {
            msg.encode_onto(dst)?;
            let len = dst.len() - len_pos;
            if len > CELL_DATA_LEN {
                return Err(Error::CantEncode("fixed cell body too long"));
            }
            dst.write_zeros(CELL_DATA_LEN - len);
        }
        Ok(())
    }

    /// Try to decode one cell from the front of `src`.
    ///
    /// Returns `Ok(None)` if `src` doesn't yet hold a whole cell (the caller
    /// should read more and retry); returns `Err` on a definite framing
    /// violation.
    pub fn decode_cell<M: ChanMsg>(&mut self, src: &mut BytesMut) -> Result<Option<ChanCell<M>>> {
        if src.len() < 5 {
            return Ok(None);
        }
        let cmd: ChanCmd = src[4].into();
        let total_len = if cmd.is_var_cell() {
            if src.len() < 7 {
                return Ok(None);
            }
            let body_len = u16::from_be_bytes([src[5], src[6]]) as usize;
            7 + body_len
        } else {
            super::CELL_LEN
        };
        if src.len() < total_len {
            return Ok(None);
        }

        let circid_val = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        let circid = CircId::new(circid_val);
        if !cmd.accepts_circid_val(circid) {
            return Err(Error::MalformedCell(
                "command does not accept this circuit ID",
            ));
        }

        let body_start = if cmd.is_var_cell() { 7 } else { 5 };
        let body = &src[body_start..total_len];
        let mut r = tor_bytes::Reader::from_slice(body);
        let msg = M::decode_from_reader(cmd, &mut r).map_err(|err| Error::BytesErr {
            parsed: "channel cell body",
            err,
        })?;
        r.should_be_exhausted().map_err(|err| Error::BytesErr {
            parsed: "channel cell body",
            err,
        })?;

        let cell = src.split_to(total_len);
        debug_assert_eq!(cell.len(), total_len);
        Ok(Some(ChanCell::new(circid, msg)))
    }
}
