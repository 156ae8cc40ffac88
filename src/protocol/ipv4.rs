//! IPv4 protocol - RFC 791

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Fragment offsets are expressed in units of this many bytes.
pub const FRAGMENT_UNIT: usize = 8;

/// IPv4 protocol numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Protocol {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
}

impl Protocol {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Protocol::Icmp),
            6 => Some(Protocol::Tcp),
            17 => Some(Protocol::Udp),
            _ => None,
        }
    }
}

/// Fragment flags, as returned by [`Ipv4Header::flags`].
pub mod flags {
    /// Don't Fragment
    pub const DF: u8 = 0b010;
    /// More Fragments
    pub const MF: u8 = 0b001;
}

const FLAGS_SHIFT: u16 = 13;
const OFFSET_MASK: u16 = 0x1FFF;

/// Validates the fixed part of a header and returns `(header_len, total_len)`.
///
/// The total length must cover the header and fit in `buffer`; anything
/// after it (Ethernet padding) is ignored.
fn check_header(buffer: &[u8]) -> Result<(usize, usize)> {
    if buffer.len() < MIN_HEADER_SIZE {
        return Err(Error::Parse(format!(
            "IPv4 header too short: {} bytes",
            buffer.len()
        )));
    }

    let version = buffer[0] >> 4;
    if version != 4 {
        return Err(Error::Parse(format!("not an IPv4 packet (version {})", version)));
    }

    let header_len = (buffer[0] & 0x0F) as usize * 4;
    if header_len < MIN_HEADER_SIZE {
        return Err(Error::Parse(format!("IPv4 IHL too small: {}", header_len)));
    }
    if buffer.len() < header_len {
        return Err(Error::Parse("IPv4 header truncated".into()));
    }

    let total_len = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
    if total_len < header_len || total_len > buffer.len() {
        return Err(Error::InvalidPacket(format!(
            "IPv4 total length {} inconsistent with header {} / buffer {}",
            total_len,
            header_len,
            buffer.len()
        )));
    }

    Ok((header_len, total_len))
}

/// Parsed IPv4 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    /// Parses a datagram. `buffer` is trimmed to the header's total length.
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        let (header_len, total_len) = check_header(buffer)?;
        Ok(Self {
            buffer: &buffer[..total_len],
            header_len,
        })
    }

    pub fn version(&self) -> u8 {
        self.buffer[0] >> 4
    }

    pub fn ihl(&self) -> u8 {
        self.buffer[0] & 0x0F
    }

    pub fn dscp(&self) -> u8 {
        self.buffer[1] >> 2
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn flags(&self) -> u8 {
        self.buffer[6] >> 5
    }

    /// Fragment offset in 8-byte units.
    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]]) & OFFSET_MASK
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[10], self.buffer[11]])
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.header_len..]
    }

    /// Check if Don't Fragment flag is set
    pub fn dont_fragment(&self) -> bool {
        (self.flags() & flags::DF) != 0
    }

    /// Check if More Fragments flag is set
    pub fn more_fragments(&self) -> bool {
        (self.flags() & flags::MF) != 0
    }

    /// Check if this is a fragment (MF set or offset > 0)
    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset() > 0
    }

    /// Runs the checksum over the whole header, stored checksum included.
    /// A valid header sums to zero.
    pub fn validate_checksum(&self) -> bool {
        checksum(&self.buffer[..self.header_len]) == 0
    }

    /// Raw header bytes, options included.
    pub fn header_bytes(&self) -> &'a [u8] {
        &self.buffer[..self.header_len]
    }

    /// The datagram up to its total length.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.buffer
    }
}

/// Internet checksum (RFC 1071) over `data`.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([pair[0], pair[1]]) as u32);
    }
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add(u16::from_be_bytes([*last, 0]) as u32);
    }

    // Fold 32-bit sum to 16 bits
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// Owned IPv4 datagram that the forwarding path rewrites in place.
#[derive(Debug, Clone)]
pub struct Ipv4Packet {
    buffer: Vec<u8>,
    header_len: usize,
}

impl Ipv4Packet {
    /// Copies a datagram, dropping any bytes past its total length.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (header_len, total_len) = check_header(data)?;
        Ok(Self {
            buffer: data[..total_len].to_vec(),
            header_len,
        })
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    /// Decrements TTL and updates the checksum.
    ///
    /// Returns false, leaving the packet untouched, if TTL is already 0.
    pub fn decrement_ttl(&mut self) -> bool {
        if self.buffer[8] == 0 {
            return false;
        }

        self.buffer[8] -= 1;
        self.update_checksum();
        true
    }

    /// Recalculate and update header checksum
    pub fn update_checksum(&mut self) {
        self.buffer[10] = 0;
        self.buffer[11] = 0;

        let sum = checksum(&self.buffer[..self.header_len]);
        self.buffer[10..12].copy_from_slice(&sum.to_be_bytes());
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    fn flags_offset(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    pub fn dont_fragment(&self) -> bool {
        (self.flags_offset() >> FLAGS_SHIFT) as u8 & flags::DF != 0
    }

    pub fn more_fragments(&self) -> bool {
        (self.flags_offset() >> FLAGS_SHIFT) as u8 & flags::MF != 0
    }

    pub fn fragment_offset(&self) -> u16 {
        self.flags_offset() & OFFSET_MASK
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn header(&self) -> &[u8] {
        &self.buffer[..self.header_len]
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.header_len..]
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Splits the datagram so that no piece carries more than
    /// `max_payload` bytes of payload.
    ///
    /// Every piece but the last carries the same amount, rounded down to a
    /// multiple of 8. Each piece copies the header (options included), keeps
    /// the identification, gets an offset relative to this datagram's own
    /// offset, and has MF set. The last piece inherits this datagram's MF.
    /// Checksums are recomputed.
    pub fn fragment(&self, max_payload: usize) -> Result<Vec<Ipv4Packet>> {
        let chunk = max_payload - max_payload % FRAGMENT_UNIT;
        if chunk == 0 {
            return Err(Error::InvalidPacket(format!(
                "fragment budget of {} bytes is below {}",
                max_payload, FRAGMENT_UNIT
            )));
        }

        let header = self.header();
        let base_offset = self.fragment_offset() as usize;
        let keep_flags = self.flags_offset() & !OFFSET_MASK & !mf_bit();
        let original_mf = self.more_fragments();

        let pieces: Vec<&[u8]> = self.payload().chunks(chunk).collect();
        let count = pieces.len();
        let mut fragments = Vec::with_capacity(count);

        for (i, piece) in pieces.into_iter().enumerate() {
            let offset_units = base_offset + (i * chunk) / FRAGMENT_UNIT;
            if offset_units > OFFSET_MASK as usize {
                return Err(Error::InvalidPacket(format!(
                    "fragment offset {} overflows",
                    offset_units
                )));
            }

            let last = i + 1 == count;
            let mut flags_offset = keep_flags | offset_units as u16;
            if !last || original_mf {
                flags_offset |= mf_bit();
            }

            let total_len = header.len() + piece.len();
            let mut buffer = Vec::with_capacity(total_len);
            buffer.extend_from_slice(header);
            buffer.extend_from_slice(piece);
            buffer[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
            buffer[6..8].copy_from_slice(&flags_offset.to_be_bytes());

            let mut fragment = Ipv4Packet {
                buffer,
                header_len: self.header_len,
            };
            fragment.update_checksum();
            fragments.push(fragment);
        }

        Ok(fragments)
    }
}

fn mf_bit() -> u16 {
    (flags::MF as u16) << FLAGS_SHIFT
}

/// Builder for constructing IPv4 packets
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    dscp: u8,
    identification: u16,
    dont_fragment: bool,
    more_fragments: bool,
    fragment_offset: u16,
    ttl: u8,
    protocol: u8,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
    payload: Vec<u8>,
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self {
            dscp: 0,
            identification: 0,
            dont_fragment: false,
            more_fragments: false,
            fragment_offset: 0,
            ttl: 64,
            protocol: 0,
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            payload: Vec::new(),
        }
    }

    pub fn dscp(mut self, dscp: u8) -> Self {
        self.dscp = dscp & 0x3F;
        self
    }

    pub fn identification(mut self, id: u16) -> Self {
        self.identification = id;
        self
    }

    pub fn dont_fragment(mut self, df: bool) -> Self {
        self.dont_fragment = df;
        self
    }

    pub fn more_fragments(mut self, mf: bool) -> Self {
        self.more_fragments = mf;
        self
    }

    pub fn fragment_offset(mut self, offset: u16) -> Self {
        self.fragment_offset = offset & OFFSET_MASK;
        self
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn src_addr(mut self, addr: Ipv4Addr) -> Self {
        self.src_addr = addr;
        self
    }

    pub fn dst_addr(mut self, addr: Ipv4Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let total_length = MIN_HEADER_SIZE + self.payload.len();
        let mut buffer = vec![0u8; total_length];

        // Version (4) + IHL (5 = 20 bytes, no options)
        buffer[0] = 0x45;
        buffer[1] = self.dscp << 2;
        buffer[2..4].copy_from_slice(&(total_length as u16).to_be_bytes());
        buffer[4..6].copy_from_slice(&self.identification.to_be_bytes());

        let mut flags_frag = self.fragment_offset;
        if self.dont_fragment {
            flags_frag |= (flags::DF as u16) << FLAGS_SHIFT;
        }
        if self.more_fragments {
            flags_frag |= mf_bit();
        }
        buffer[6..8].copy_from_slice(&flags_frag.to_be_bytes());

        buffer[8] = self.ttl;
        buffer[9] = self.protocol;
        buffer[12..16].copy_from_slice(&self.src_addr.octets());
        buffer[16..20].copy_from_slice(&self.dst_addr.octets());
        buffer[MIN_HEADER_SIZE..].copy_from_slice(&self.payload);

        let sum = checksum(&buffer[..MIN_HEADER_SIZE]);
        buffer[10..12].copy_from_slice(&sum.to_be_bytes());

        buffer
    }
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self::new()
    }
}
