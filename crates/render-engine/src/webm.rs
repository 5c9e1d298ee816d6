//! Minimal WebM (Matroska/EBML) support.
//!
//! Streaming recorders write the Segment with an unknown size and an Info
//! element without a Duration, because neither is known while recording.
//! Players then report a zero or unknown duration and refuse to seek. This
//! module can write such a stream ([`WebmWriter`]), repair it afterwards
//! ([`set_duration`]), and inspect it ([`probe`]).

/// EBML element IDs used here (marker bits included).
pub mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const EBML_VERSION: u32 = 0x4286;
    pub const EBML_READ_VERSION: u32 = 0x42F7;
    pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
    pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const DOC_TYPE_VERSION: u32 = 0x4287;
    pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;
    pub const SEGMENT: u32 = 0x1853_8067;
    pub const INFO: u32 = 0x1549_A966;
    pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
    pub const DURATION: u32 = 0x4489;
    pub const MUXING_APP: u32 = 0x4D80;
    pub const WRITING_APP: u32 = 0x5741;
    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_UID: u32 = 0x73C5;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const CODEC_ID: u32 = 0x86;
    pub const VIDEO: u32 = 0xE0;
    pub const PIXEL_WIDTH: u32 = 0xB0;
    pub const PIXEL_HEIGHT: u32 = 0xBA;
    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;
    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMECODE: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
}

/// Default Matroska timecode scale: 1 ms per tick.
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// Track number of the video track written by [`WebmWriter`].
pub const VIDEO_TRACK: u64 = 1;
/// Track number of the audio track written by [`WebmWriter`].
pub const AUDIO_TRACK: u64 = 2;

/// Longest cluster span; SimpleBlock timecodes are signed 16-bit offsets.
const MAX_CLUSTER_SPAN_MS: u64 = 30_000;

/// Bytes of the all-ones 8-byte "unknown size" marker.
const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebmError {
    #[error("WebM data is truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("Not a WebM/EBML stream")]
    NotWebm,

    #[error("Segment Info element not found")]
    InfoNotFound,

    #[error("Invalid duration {0}")]
    InvalidDuration(String),

    #[error("Unsupported layout: {0}")]
    Unsupported(&'static str),
}

// -- encoding ---------------------------------------------------------------

fn push_id(buf: &mut Vec<u8>, id: u32) {
    let bytes = id.to_be_bytes();
    let skip = match id {
        0..=0xFF => 3,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 1,
        _ => 0,
    };
    buf.extend_from_slice(&bytes[skip..]);
}

/// Encode a data size as an EBML vint of minimal length.
pub fn encode_size(value: u64) -> Vec<u8> {
    let len = (1..=8)
        .find(|&len| value < (1u64 << (7 * len)) - 1)
        .unwrap_or(8);
    encode_size_fixed(value, len).unwrap_or_else(|| UNKNOWN_SIZE.to_vec())
}

/// Encode a data size as an EBML vint of exactly `len` bytes, if it fits.
pub fn encode_size_fixed(value: u64, len: usize) -> Option<Vec<u8>> {
    if !(1..=8).contains(&len) || value >= (1u64 << (7 * len)) - 1 {
        return None;
    }
    let marked = value | (1u64 << (7 * len));
    Some(marked.to_be_bytes()[8 - len..].to_vec())
}

fn element(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 12);
    push_id(&mut buf, id);
    buf.extend_from_slice(&encode_size(payload.len() as u64));
    buf.extend_from_slice(payload);
    buf
}

fn uint_element(id: u32, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = (value.leading_zeros() / 8).min(7) as usize;
    element(id, &bytes[skip..])
}

fn float_element(id: u32, value: f64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

fn string_element(id: u32, value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

// -- decoding ---------------------------------------------------------------

/// Read a vint at `pos`; returns `(value without marker, length, all_ones)`.
fn read_vint(buf: &[u8], pos: usize) -> Result<(u64, usize, bool), WebmError> {
    let first = *buf.get(pos).ok_or(WebmError::Truncated { offset: pos })?;
    if first == 0 {
        return Err(WebmError::NotWebm);
    }
    let len = first.leading_zeros() as usize + 1;
    if pos + len > buf.len() {
        return Err(WebmError::Truncated { offset: pos });
    }
    let mut value = (first as u64) & (0xFF >> len);
    for byte in &buf[pos + 1..pos + len] {
        value = (value << 8) | *byte as u64;
    }
    let all_ones = value == (1u64 << (7 * len)) - 1;
    Ok((value, len, all_ones))
}

fn read_id(buf: &[u8], pos: usize) -> Result<(u32, usize), WebmError> {
    let first = *buf.get(pos).ok_or(WebmError::Truncated { offset: pos })?;
    let len = first.leading_zeros() as usize + 1;
    if first == 0 || len > 4 {
        return Err(WebmError::NotWebm);
    }
    if pos + len > buf.len() {
        return Err(WebmError::Truncated { offset: pos });
    }
    let id = buf[pos..pos + len]
        .iter()
        .fold(0u32, |acc, byte| (acc << 8) | *byte as u32);
    Ok((id, len))
}

/// A parsed element header.
#[derive(Debug, Clone, Copy)]
struct Header {
    id: u32,
    /// Offset of the element's first byte.
    start: usize,
    /// Offset of the size field.
    size_pos: usize,
    /// Length of the size field.
    size_len: usize,
    /// Offset of the payload.
    data: usize,
    /// Payload length; `None` for unknown-size elements.
    size: Option<u64>,
}

impl Header {
    fn end(&self, buf_len: usize) -> usize {
        match self.size {
            Some(size) => (self.data as u64 + size).min(buf_len as u64) as usize,
            None => buf_len,
        }
    }
}

fn read_header(buf: &[u8], pos: usize) -> Result<Header, WebmError> {
    let (id, id_len) = read_id(buf, pos)?;
    let size_pos = pos + id_len;
    let (size, size_len, unknown) = read_vint(buf, size_pos)?;
    Ok(Header {
        id,
        start: pos,
        size_pos,
        size_len,
        data: size_pos + size_len,
        size: if unknown { None } else { Some(size) },
    })
}

fn read_uint(payload: &[u8]) -> u64 {
    payload
        .iter()
        .take(8)
        .fold(0u64, |acc, byte| (acc << 8) | *byte as u64)
}

fn read_float(payload: &[u8]) -> Option<f64> {
    match payload.len() {
        4 => Some(f32::from_be_bytes(payload.try_into().ok()?) as f64),
        8 => Some(f64::from_be_bytes(payload.try_into().ok()?)),
        _ => None,
    }
}

/// Iterate direct children of the element spanning `[from, to)`.
///
/// A child whose header runs past `to` ends the walk with `Truncated`.
fn children(buf: &[u8], from: usize, to: usize) -> impl Iterator<Item = Result<Header, WebmError>> + '_ {
    let mut pos = from;
    let mut failed = false;
    std::iter::from_fn(move || {
        if failed || pos >= to {
            return None;
        }
        match read_header(buf, pos) {
            Ok(header) if header.data > to => {
                failed = true;
                Some(Err(WebmError::Truncated {
                    offset: header.start,
                }))
            }
            Ok(header) => {
                pos = header.end(to);
                if header.size.is_none() {
                    failed = true;
                }
                Some(Ok(header))
            }
            Err(e) => {
                failed = true;
                Some(Err(e))
            }
        }
    })
}

/// Locate the EBML header and the Segment that follows it.
fn segment_header(buf: &[u8]) -> Result<Header, WebmError> {
    let ebml = read_header(buf, 0)?;
    if ebml.id != ids::EBML {
        return Err(WebmError::NotWebm);
    }
    let ebml_size = ebml.size.ok_or(WebmError::NotWebm)?;
    let segment = read_header(buf, ebml.data + ebml_size as usize)?;
    if segment.id != ids::SEGMENT {
        return Err(WebmError::NotWebm);
    }
    Ok(segment)
}

// -- duration repair --------------------------------------------------------

/// Write `duration_secs` into Segment/Info/Duration.
///
/// An existing Duration is overwritten in place; otherwise one is appended
/// to Info and the Info (and a known Segment) size is rewritten.
pub fn set_duration(buf: &mut Vec<u8>, duration_secs: f64) -> Result<(), WebmError> {
    if !duration_secs.is_finite() || duration_secs < 0.0 {
        return Err(WebmError::InvalidDuration(duration_secs.to_string()));
    }

    let segment = segment_header(buf)?;
    let seg_end = segment.end(buf.len());
    let info = children(buf, segment.data, seg_end)
        .find(|h| !matches!(h, Ok(h) if h.id != ids::INFO))
        .ok_or(WebmError::InfoNotFound)??;
    let info_size = info.size.ok_or(WebmError::Unsupported("unknown-size Info"))?;
    let info_end = info.end(buf.len());

    let mut scale = DEFAULT_TIMECODE_SCALE;
    let mut existing = None;
    for child in children(buf, info.data, info_end) {
        let child = child?;
        let payload = &buf[child.data..child.end(info_end)];
        match child.id {
            ids::TIMECODE_SCALE => scale = read_uint(payload).max(1),
            ids::DURATION => existing = Some((child.data, payload.len())),
            _ => {}
        }
    }

    let ticks = duration_secs * 1_000_000_000.0 / scale as f64;

    if let Some((offset, len)) = existing {
        match len {
            4 => buf[offset..offset + 4].copy_from_slice(&(ticks as f32).to_be_bytes()),
            8 => buf[offset..offset + 8].copy_from_slice(&ticks.to_be_bytes()),
            _ => return Err(WebmError::Unsupported("Duration of unusual width")),
        }
        return Ok(());
    }

    let inserted = float_element(ids::DURATION, ticks);
    let grown_by = inserted.len() as u64;
    buf.splice(info_end..info_end, inserted);
    let info_delta = resize_field(buf, info.size_pos, info.size_len, info_size + grown_by)?;

    if let Some(segment_size) = segment.size {
        let total = grown_by as i64 + info_delta;
        resize_field(
            buf,
            segment.size_pos,
            segment.size_len,
            (segment_size as i64 + total) as u64,
        )?;
    }

    Ok(())
}

/// Rewrite a size field, keeping its width when possible. Returns the
/// change in byte length.
fn resize_field(
    buf: &mut Vec<u8>,
    pos: usize,
    old_len: usize,
    new_size: u64,
) -> Result<i64, WebmError> {
    let encoded = encode_size_fixed(new_size, old_len).unwrap_or_else(|| encode_size(new_size));
    if encoded.len() > 8 {
        return Err(WebmError::Unsupported("size field overflow"));
    }
    let delta = encoded.len() as i64 - old_len as i64;
    buf.splice(pos..pos + old_len, encoded);
    Ok(delta)
}

// -- inspection -------------------------------------------------------------

/// What [`probe`] found in a WebM stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebmSummary {
    /// Duration declared in Info, in seconds.
    pub duration_secs: Option<f64>,
    pub timecode_scale: u64,
    pub video_blocks: u64,
    pub audio_blocks: u64,
    /// Timestamp of the last video block, in seconds.
    pub last_video_secs: Option<f64>,
    pub clusters: u64,
}

/// Walk the stream and summarize Info and Clusters.
pub fn probe(buf: &[u8]) -> Result<WebmSummary, WebmError> {
    let segment = segment_header(buf)?;
    let seg_end = segment.end(buf.len());
    let mut summary = WebmSummary {
        timecode_scale: DEFAULT_TIMECODE_SCALE,
        ..WebmSummary::default()
    };
    let mut raw_duration = None;

    for child in children(buf, segment.data, seg_end) {
        let child = child?;
        let end = child.end(seg_end);
        match child.id {
            ids::INFO => {
                for field in children(buf, child.data, end) {
                    let field = field?;
                    let payload = &buf[field.data..field.end(end)];
                    match field.id {
                        ids::TIMECODE_SCALE => summary.timecode_scale = read_uint(payload).max(1),
                        ids::DURATION => raw_duration = read_float(payload),
                        _ => {}
                    }
                }
            }
            ids::CLUSTER => {
                if child.size.is_none() {
                    return Err(WebmError::Unsupported("unknown-size Cluster"));
                }
                summary.clusters += 1;
                probe_cluster(buf, child.data, end, &mut summary)?;
            }
            _ => {}
        }
    }

    let scale = summary.timecode_scale as f64;
    summary.duration_secs = raw_duration.map(|ticks| ticks * scale / 1_000_000_000.0);
    if let Some(last) = summary.last_video_secs.as_mut() {
        *last = *last * scale / 1_000_000_000.0;
    }
    Ok(summary)
}

fn probe_cluster(
    buf: &[u8],
    from: usize,
    to: usize,
    summary: &mut WebmSummary,
) -> Result<(), WebmError> {
    let mut cluster_tc = 0u64;
    for field in children(buf, from, to) {
        let field = field?;
        let payload = &buf[field.data..field.end(to)];
        match field.id {
            ids::TIMECODE => cluster_tc = read_uint(payload),
            ids::SIMPLE_BLOCK => {
                let (track, track_len, _) = read_vint(payload, 0)?;
                let rel = payload
                    .get(track_len..track_len + 2)
                    .ok_or(WebmError::Truncated { offset: field.data })?;
                let rel = i16::from_be_bytes([rel[0], rel[1]]) as i64;
                let ticks = (cluster_tc as i64 + rel).max(0) as f64;
                match track {
                    VIDEO_TRACK => {
                        summary.video_blocks += 1;
                        let last = summary.last_video_secs.get_or_insert(ticks);
                        *last = last.max(ticks);
                    }
                    AUDIO_TRACK => summary.audio_blocks += 1,
                    _ => {}
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// -- streaming writer -------------------------------------------------------

/// Track layout for [`WebmWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct WebmTrackConfig {
    pub width: u32,
    pub height: u32,
    /// Matroska codec id, e.g. `V_VP9`.
    pub video_codec: String,
    /// Matroska codec id, e.g. `A_OPUS`; `None` writes no audio track.
    pub audio_codec: Option<String>,
    pub sample_rate: f64,
    pub channels: u64,
}

impl WebmTrackConfig {
    /// Derive Matroska codec ids from a recorder mime type.
    pub fn for_mime(mime: &str, width: u32, height: u32) -> Self {
        let lower = mime.to_ascii_lowercase();
        let video_codec = if lower.contains("vp8") { "V_VP8" } else { "V_VP9" };
        Self {
            width,
            height,
            video_codec: video_codec.to_string(),
            audio_codec: Some("A_OPUS".to_string()),
            sample_rate: 48_000.0,
            channels: 2,
        }
    }
}

struct OpenCluster {
    start_ms: u64,
    body: Vec<u8>,
}

/// Writes a live-style WebM stream: unknown-size Segment, no Duration,
/// one Cluster per flush.
pub struct WebmWriter {
    config: WebmTrackConfig,
    header_pending: bool,
    cluster: Option<OpenCluster>,
}

impl WebmWriter {
    pub fn new(config: WebmTrackConfig) -> Self {
        Self {
            config,
            header_pending: true,
            cluster: None,
        }
    }

    /// EBML header, Segment start, Info, and Tracks.
    fn header(&self) -> Vec<u8> {
        let mut ebml = Vec::new();
        ebml.extend(uint_element(ids::EBML_VERSION, 1));
        ebml.extend(uint_element(ids::EBML_READ_VERSION, 1));
        ebml.extend(uint_element(ids::EBML_MAX_ID_LENGTH, 4));
        ebml.extend(uint_element(ids::EBML_MAX_SIZE_LENGTH, 8));
        ebml.extend(string_element(ids::DOC_TYPE, "webm"));
        ebml.extend(uint_element(ids::DOC_TYPE_VERSION, 4));
        ebml.extend(uint_element(ids::DOC_TYPE_READ_VERSION, 2));

        let mut info = Vec::new();
        info.extend(uint_element(ids::TIMECODE_SCALE, DEFAULT_TIMECODE_SCALE));
        info.extend(string_element(ids::MUXING_APP, "lyricap"));
        info.extend(string_element(ids::WRITING_APP, "lyricap"));

        let mut video = Vec::new();
        video.extend(uint_element(ids::PIXEL_WIDTH, self.config.width as u64));
        video.extend(uint_element(ids::PIXEL_HEIGHT, self.config.height as u64));

        let mut video_entry = Vec::new();
        video_entry.extend(uint_element(ids::TRACK_NUMBER, VIDEO_TRACK));
        video_entry.extend(uint_element(ids::TRACK_UID, VIDEO_TRACK));
        video_entry.extend(uint_element(ids::TRACK_TYPE, 1));
        video_entry.extend(string_element(ids::CODEC_ID, &self.config.video_codec));
        video_entry.extend(element(ids::VIDEO, &video));

        let mut tracks = element(ids::TRACK_ENTRY, &video_entry);
        if let Some(audio_codec) = &self.config.audio_codec {
            let mut audio = Vec::new();
            audio.extend(float_element(ids::SAMPLING_FREQUENCY, self.config.sample_rate));
            audio.extend(uint_element(ids::CHANNELS, self.config.channels));

            let mut audio_entry = Vec::new();
            audio_entry.extend(uint_element(ids::TRACK_NUMBER, AUDIO_TRACK));
            audio_entry.extend(uint_element(ids::TRACK_UID, AUDIO_TRACK));
            audio_entry.extend(uint_element(ids::TRACK_TYPE, 2));
            audio_entry.extend(string_element(ids::CODEC_ID, audio_codec));
            audio_entry.extend(element(ids::AUDIO, &audio));
            tracks.extend(element(ids::TRACK_ENTRY, &audio_entry));
        }

        let mut out = element(ids::EBML, &ebml);
        push_id(&mut out, ids::SEGMENT);
        out.extend_from_slice(&UNKNOWN_SIZE);
        out.extend(element(ids::INFO, &info));
        out.extend(element(ids::TRACKS, &tracks));
        out
    }

    /// Append a block. Returns a finished cluster when this block had to
    /// start a new one because the open cluster got too long.
    pub fn push_block(
        &mut self,
        track: u64,
        timestamp_ms: u64,
        keyframe: bool,
        payload: &[u8],
    ) -> Option<Vec<u8>> {
        let rolled = match &self.cluster {
            Some(open) if timestamp_ms.saturating_sub(open.start_ms) > MAX_CLUSTER_SPAN_MS => {
                self.flush()
            }
            _ => None,
        };

        let open = self.cluster.get_or_insert_with(|| OpenCluster {
            start_ms: timestamp_ms,
            body: uint_element(ids::TIMECODE, timestamp_ms),
        });
        let rel = timestamp_ms.saturating_sub(open.start_ms).min(i16::MAX as u64) as i16;

        let mut block = encode_size(track);
        block.extend_from_slice(&rel.to_be_bytes());
        block.push(if keyframe { 0x80 } else { 0x00 });
        block.extend_from_slice(payload);
        open.body.extend(element(ids::SIMPLE_BLOCK, &block));

        rolled
    }

    /// Close the open cluster and return the bytes written since the last
    /// flush (the stream header is prepended to the first flush).
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        let cluster = self.cluster.take();
        if cluster.is_none() && !self.header_pending {
            return None;
        }

        let mut out = Vec::new();
        if self.header_pending {
            out.extend(self.header());
            self.header_pending = false;
        }
        if let Some(cluster) = cluster {
            out.extend(element(ids::CLUSTER, &cluster.body));
        }
        Some(out)
    }
}
