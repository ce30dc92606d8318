use std::io::IoSlice;

/// Produces the wire bytes for one outgoing message. The real marshaller
/// (generated per-message encoders) is out of scope; this trait is the
/// seam the outgoing handler binds against.
///
/// Messages are exposed as a sequence of segments rather than one
/// contiguous buffer so a single message can itself be scattered across
/// several `IoSlice`s, the way a SPICE message with sub-messages or an
/// attached data blob is.
pub trait Marshal {
    /// The message type tag written into the header.
    fn msg_type(&self) -> u16;

    /// Number of trailing sub-messages folded into this item's header
    /// `sub_list` field. Zero for ordinary messages.
    fn sub_list(&self) -> u32 {
        0
    }

    /// The segments making up this message's body, in order. Their
    /// combined length is the header's `size` field.
    fn segments(&self) -> &[Vec<u8>];

    #[inline]
    fn body_len(&self) -> usize {
        self.segments().iter().map(Vec::len).sum()
    }
}

/// A marshalled message built from already-encoded segments. The
/// concrete stand-in shipped here so the outgoing handler's scatter/gather
/// path is exercisable without a real generated marshaller.
#[derive(Debug, Clone)]
pub struct Message {
    msg_type: u16,
    sub_list: u32,
    segments: Vec<Vec<u8>>,
}

impl Message {
    #[inline]
    pub fn new(msg_type: u16, segments: Vec<Vec<u8>>) -> Self {
        Message {
            msg_type,
            sub_list: 0,
            segments,
        }
    }

    #[inline]
    pub fn single(msg_type: u16, body: Vec<u8>) -> Self {
        Message::new(msg_type, vec![body])
    }

    #[inline]
    pub fn with_sub_list(mut self, sub_list: u32) -> Self {
        self.sub_list = sub_list;
        self
    }
}

impl Marshal for Message {
    #[inline]
    fn msg_type(&self) -> u16 {
        self.msg_type
    }

    #[inline]
    fn sub_list(&self) -> u32 {
        self.sub_list
    }

    #[inline]
    fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }
}

/// Builds the `IoSlice` list for one message's header + body segments,
/// capped at `max_vec` entries the way `red_peer_handle_outgoing` bounds a
/// single `writev` call. Returns the slices actually included and whether
/// any segments were left over (meaning the writer must revisit this
/// message on the next readiness event).
pub fn build_vec<'a>(
    header: &'a [u8],
    message: &'a dyn Marshal,
    skip_bytes: usize,
    max_vec: usize,
) -> (Vec<IoSlice<'a>>, bool) {
    let mut slices = Vec::with_capacity(max_vec);
    let mut skip = skip_bytes;
    let mut truncated = false;

    if skip < header.len() {
        slices.push(IoSlice::new(&header[skip..]));
        skip = 0;
    } else {
        skip -= header.len();
    }

    for segment in message.segments() {
        if slices.len() >= max_vec {
            truncated = true;
            break;
        }
        if skip >= segment.len() {
            skip -= segment.len();
            continue;
        }
        slices.push(IoSlice::new(&segment[skip..]));
        skip = 0;
    }

    (slices, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::header::SpiceDataHeader;

    #[test]
    fn builds_one_slice_per_header_and_segment() {
        let message = Message::new(1, vec![vec![1, 2], vec![3, 4, 5]]);
        let header_bytes = [0u8; SpiceDataHeader::SIZE];
        let (slices, truncated) = build_vec(&header_bytes, &message, 0, 16);

        assert!(!truncated);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].len(), SpiceDataHeader::SIZE);
        assert_eq!(&*slices[1], &[1, 2][..]);
        assert_eq!(&*slices[2], &[3, 4, 5][..]);
    }

    #[test]
    fn caps_segment_count_at_max_vec() {
        let message = Message::new(1, vec![vec![1], vec![2], vec![3]]);
        let header_bytes = [0u8; SpiceDataHeader::SIZE];
        let (slices, truncated) = build_vec(&header_bytes, &message, 0, 2);

        assert!(truncated);
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn skip_bytes_resumes_mid_header() {
        let message = Message::new(1, vec![vec![9, 9]]);
        let header_bytes = [0u8; SpiceDataHeader::SIZE];
        let (slices, _) = build_vec(&header_bytes, &message, SpiceDataHeader::SIZE + 1, 16);

        assert_eq!(slices.len(), 1);
        assert_eq!(&*slices[0], &[9][..]);
    }
}
