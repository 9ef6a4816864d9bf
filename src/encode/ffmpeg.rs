//! Subprocess-backed encoders.
//!
//! The system `ffmpeg` binary does the actual compression (avoiding native
//! FFmpeg dev header/lib requirements); we pipe raw media in and parse the
//! elementary stream it emits back. VP9 comes wrapped in IVF and AAC in
//! ADTS, both chosen because their framing is trivial to parse, which is
//! what gives every chunk its timestamp and key flag.

use std::collections::VecDeque;
use std::io::Read;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::JoinHandle;

use crate::foundation::core::{Fps, TimeMs};
use crate::foundation::error::{ForgeError, ForgeResult};
use crate::media::probe::is_ffmpeg_on_path;

use super::encoder::{AudioEncoder, EncodedChunk, TrackFormat, VideoEncoder};

pub(crate) const IVF_HEADER_LEN: usize = 32;
pub(crate) const IVF_FRAME_HEADER_LEN: usize = 12;

/// AAC always packs this many PCM sample frames per ADTS frame.
pub(crate) const AAC_SAMPLES_PER_FRAME: u64 = 1024;

const ADTS_SAMPLE_RATES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025, 8_000,
    7_350,
];

/// Incremental IVF demuxer. Feed arbitrary byte slices, get back whole
/// frame payloads (the 12-byte frame headers are consumed here).
pub(crate) struct IvfParser {
    buf: Vec<u8>,
    header_done: bool,
}

impl IvfParser {
    pub(crate) fn new() -> Self {
        Self {
            buf: Vec::new(),
            header_done: false,
        }
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) -> ForgeResult<Vec<Vec<u8>>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        if !self.header_done {
            if self.buf.len() < IVF_HEADER_LEN {
                return Ok(out);
            }
            if &self.buf[0..4] != b"DKIF" {
                return Err(ForgeError::pipeline(
                    "video encoder output is not an IVF stream",
                ));
            }
            self.buf.drain(..IVF_HEADER_LEN);
            self.header_done = true;
        }

        while self.buf.len() >= IVF_FRAME_HEADER_LEN {
            let size = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
                as usize;
            if self.buf.len() < IVF_FRAME_HEADER_LEN + size {
                break;
            }
            out.push(self.buf[IVF_FRAME_HEADER_LEN..IVF_FRAME_HEADER_LEN + size].to_vec());
            self.buf.drain(..IVF_FRAME_HEADER_LEN + size);
        }
        Ok(out)
    }
}

/// Key-frame test on the first byte of a VP9 uncompressed header.
///
/// Layout (MSB first): frame_marker(2) profile_low(1) profile_high(1)
/// [reserved(1) when profile == 3] show_existing_frame(1) frame_type(1).
/// A frame is a sync sample when show_existing_frame == 0 and
/// frame_type == 0.
pub(crate) fn vp9_is_keyframe(payload: &[u8]) -> bool {
    let Some(&b0) = payload.first() else {
        return false;
    };
    if b0 >> 6 != 0b10 {
        return false;
    }
    let profile = (((b0 >> 4) & 1) << 1) | ((b0 >> 5) & 1);
    let shift = if profile == 3 { 1 } else { 0 };
    let show_existing = (b0 >> (3 - shift)) & 1;
    let frame_type = (b0 >> (2 - shift)) & 1;
    show_existing == 0 && frame_type == 0
}

/// Frame length field of an ADTS header (covers header + payload).
pub(crate) fn adts_frame_len(header: &[u8]) -> Option<usize> {
    if header.len() < 6 || header[0] != 0xFF || (header[1] & 0xF0) != 0xF0 {
        return None;
    }
    let len = (usize::from(header[3] & 0x03) << 11)
        | (usize::from(header[4]) << 3)
        | (usize::from(header[5]) >> 5);
    (len > 0).then_some(len)
}

pub(crate) fn adts_sample_rate(header: &[u8]) -> Option<u32> {
    if header.len() < 3 || header[0] != 0xFF || (header[1] & 0xF0) != 0xF0 {
        return None;
    }
    ADTS_SAMPLE_RATES
        .get(usize::from((header[2] >> 2) & 0x0F))
        .copied()
}

/// Incremental ADTS splitter. Emits whole frames including their headers,
/// since the spooled stream keeps ADTS framing.
pub(crate) struct AdtsParser {
    buf: Vec<u8>,
}

impl AdtsParser {
    pub(crate) fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) -> ForgeResult<Vec<Vec<u8>>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        loop {
            if self.buf.len() < 7 {
                break;
            }
            let Some(len) = adts_frame_len(&self.buf) else {
                return Err(ForgeError::pipeline(
                    "audio encoder output is not an ADTS stream",
                ));
            };
            if self.buf.len() < len {
                break;
            }
            out.push(self.buf[..len].to_vec());
            self.buf.drain(..len);
        }
        Ok(out)
    }
}

struct EncoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    payload_rx: Receiver<Vec<u8>>,
    reader: Option<JoinHandle<ForgeResult<()>>>,
    stderr: Option<JoinHandle<String>>,
}

impl EncoderProcess {
    fn spawn(
        args: &[&str],
        parse: impl FnMut(&[u8], &Sender<Vec<u8>>) -> ForgeResult<()> + Send + 'static,
    ) -> ForgeResult<Self> {
        if !is_ffmpeg_on_path() {
            return Err(ForgeError::resource(
                "ffmpeg is required for encoding, but was not found on PATH",
            ));
        }
        let mut child = Command::new("ffmpeg")
            .args(["-loglevel", "error"])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ForgeError::resource(format!("failed to spawn ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ForgeError::pipeline("failed to open ffmpeg stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ForgeError::pipeline("failed to open ffmpeg stdout"))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ForgeError::pipeline("failed to open ffmpeg stderr"))?;

        let (payload_tx, payload_rx) = channel();
        let reader = std::thread::spawn(move || {
            let mut parse = parse;
            let mut chunk = [0u8; 64 * 1024];
            loop {
                let n = stdout
                    .read(&mut chunk)
                    .map_err(|e| ForgeError::pipeline(format!("ffmpeg stdout read failed: {e}")))?;
                if n == 0 {
                    return Ok(());
                }
                parse(&chunk[..n], &payload_tx)?;
            }
        });
        // Drain stderr so ffmpeg never blocks on a full pipe; keep the text
        // for error reporting.
        let stderr = std::thread::spawn(move || {
            let mut text = String::new();
            let _ = stderr_pipe.read_to_string(&mut text);
            text
        });

        Ok(Self {
            child,
            stdin: Some(stdin),
            payload_rx,
            reader: Some(reader),
            stderr: Some(stderr),
        })
    }

    fn write(&mut self, bytes: &[u8]) -> ForgeResult<()> {
        use std::io::Write as _;
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ForgeError::pipeline("encoder is already finished"));
        };
        stdin
            .write_all(bytes)
            .map_err(|e| ForgeError::pipeline(format!("failed to feed ffmpeg encoder: {e}")))
    }

    fn poll_payloads(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match self.payload_rx.try_recv() {
                Ok(p) => out.push(p),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Close stdin, wait for the process and reader, return the payloads
    /// that arrived after the last poll.
    fn finish(&mut self) -> ForgeResult<Vec<Vec<u8>>> {
        drop(self.stdin.take());

        let reader_result = match self.reader.take() {
            Some(h) => h
                .join()
                .map_err(|_| ForgeError::pipeline("encoder reader thread panicked"))?,
            None => return Err(ForgeError::pipeline("encoder is already finished")),
        };

        let status = self
            .child
            .wait()
            .map_err(|e| ForgeError::pipeline(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr_text = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(ForgeError::pipeline(format!(
                "ffmpeg encoder exited with {status}: {}",
                stderr_text.trim()
            )));
        }
        reader_result?;

        let mut out = Vec::new();
        while let Ok(p) = self.payload_rx.try_recv() {
            out.push(p);
        }
        Ok(out)
    }

    fn kill(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            self.kill();
        }
    }
}

/// VP9 video encoder. Frames go in as raw premultiplied RGBA8 (alpha is
/// dropped in the yuv420p conversion, so premultiplied pixels read as
/// composited over black); chunks come out as bare VP9 access units.
pub struct FfmpegVideoEncoder {
    width: u32,
    height: u32,
    fps: Fps,
    process: EncoderProcess,
    pending_pts: VecDeque<TimeMs>,
    frames_out: u64,
}

impl FfmpegVideoEncoder {
    pub fn new(width: u32, height: u32, fps: Fps) -> ForgeResult<Self> {
        if width == 0 || height == 0 {
            return Err(ForgeError::config("encode width/height must be non-zero"));
        }
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            return Err(ForgeError::config(
                "encode width/height must be even (required for yuv420p output)",
            ));
        }

        let size = format!("{width}x{height}");
        let rate = format!("{}/{}", fps.num, fps.den);
        let mut parser = IvfParser::new();
        let process = EncoderProcess::spawn(
            &[
                "-f", "rawvideo", "-pix_fmt", "rgba", "-s", &size, "-r", &rate, "-i", "pipe:0",
                "-an", "-c:v", "libvpx-vp9", "-pix_fmt", "yuv420p", "-deadline", "realtime",
                "-cpu-used", "5", "-row-mt", "1", "-f", "ivf", "pipe:1",
            ],
            move |bytes, tx| {
                for payload in parser.push(bytes)? {
                    // Receiver gone means the encoder is being torn down.
                    if tx.send(payload).is_err() {
                        break;
                    }
                }
                Ok(())
            },
        )?;

        Ok(Self {
            width,
            height,
            fps,
            process,
            pending_pts: VecDeque::new(),
            frames_out: 0,
        })
    }

    fn chunk_from_payload(&mut self, payload: Vec<u8>) -> EncodedChunk {
        // libvpx-vp9 emits frames in presentation order, so pushed
        // timestamps map to output frames first-in first-out.
        let pts_ms = self
            .pending_pts
            .pop_front()
            .unwrap_or_else(|| self.fps.frame_to_ms(self.frames_out));
        self.frames_out += 1;
        EncodedChunk {
            pts_ms,
            key: vp9_is_keyframe(&payload),
            data: payload,
        }
    }
}

impl VideoEncoder for FfmpegVideoEncoder {
    fn format(&self) -> TrackFormat {
        TrackFormat::Video {
            codec: "vp9".to_owned(),
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }

    fn push_frame(&mut self, rgba_premul: &[u8], pts_ms: TimeMs) -> ForgeResult<()> {
        let expected = self.width as usize * self.height as usize * 4;
        if rgba_premul.len() != expected {
            return Err(ForgeError::pipeline(format!(
                "frame buffer is {} bytes, expected {expected} for {}x{} rgba",
                rgba_premul.len(),
                self.width,
                self.height
            )));
        }
        self.pending_pts.push_back(pts_ms);
        self.process.write(rgba_premul)
    }

    fn poll_chunks(&mut self) -> Vec<EncodedChunk> {
        self.process
            .poll_payloads()
            .into_iter()
            .map(|p| self.chunk_from_payload(p))
            .collect()
    }

    fn finish(&mut self) -> ForgeResult<Vec<EncodedChunk>> {
        let tail = self.process.finish()?;
        Ok(tail
            .into_iter()
            .map(|p| self.chunk_from_payload(p))
            .collect())
    }
}

/// AAC audio encoder fed interleaved stereo f32 PCM. Chunks are whole ADTS
/// frames (header kept, the spool stays a valid ADTS stream); every AAC
/// frame is a sync sample.
pub struct FfmpegAudioEncoder {
    sample_rate: u32,
    channels: u16,
    process: EncoderProcess,
    frames_out: u64,
}

impl FfmpegAudioEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> ForgeResult<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(ForgeError::config(
                "audio encode sample rate/channels must be non-zero",
            ));
        }

        let ar = sample_rate.to_string();
        let ac = channels.to_string();
        let mut parser = AdtsParser::new();
        let process = EncoderProcess::spawn(
            &[
                "-f", "f32le", "-ar", &ar, "-ac", &ac, "-i", "pipe:0", "-vn", "-c:a", "aac",
                "-b:a", "192k", "-f", "adts", "pipe:1",
            ],
            move |bytes, tx| {
                for payload in parser.push(bytes)? {
                    if tx.send(payload).is_err() {
                        break;
                    }
                }
                Ok(())
            },
        )?;

        Ok(Self {
            sample_rate,
            channels,
            process,
            frames_out: 0,
        })
    }

    fn chunk_from_payload(&mut self, payload: Vec<u8>) -> EncodedChunk {
        let num = u128::from(self.frames_out) * u128::from(AAC_SAMPLES_PER_FRAME) * 1000;
        let den = u128::from(self.sample_rate);
        let pts_ms = ((num + den / 2) / den) as TimeMs;
        self.frames_out += 1;
        EncodedChunk {
            pts_ms,
            key: true,
            data: payload,
        }
    }
}

impl AudioEncoder for FfmpegAudioEncoder {
    fn format(&self) -> TrackFormat {
        TrackFormat::Audio {
            codec: "aac".to_owned(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    fn push_samples(&mut self, interleaved_f32: &[f32]) -> ForgeResult<()> {
        let mut bytes = Vec::with_capacity(interleaved_f32.len() * 4);
        for &s in interleaved_f32 {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        self.process.write(&bytes)
    }

    fn poll_chunks(&mut self) -> Vec<EncodedChunk> {
        self.process
            .poll_payloads()
            .into_iter()
            .map(|p| self.chunk_from_payload(p))
            .collect()
    }

    fn finish(&mut self) -> ForgeResult<Vec<EncodedChunk>> {
        let tail = self.process.finish()?;
        Ok(tail
            .into_iter()
            .map(|p| self.chunk_from_payload(p))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ivf_header() -> Vec<u8> {
        let mut h = Vec::with_capacity(IVF_HEADER_LEN);
        h.extend_from_slice(b"DKIF");
        h.extend_from_slice(&0u16.to_le_bytes()); // version
        h.extend_from_slice(&(IVF_HEADER_LEN as u16).to_le_bytes());
        h.extend_from_slice(b"VP90");
        h.extend_from_slice(&320u16.to_le_bytes());
        h.extend_from_slice(&240u16.to_le_bytes());
        h.extend_from_slice(&30u32.to_le_bytes()); // timebase den
        h.extend_from_slice(&1u32.to_le_bytes()); // timebase num
        h.extend_from_slice(&2u32.to_le_bytes()); // frame count
        h.extend_from_slice(&0u32.to_le_bytes());
        h
    }

    fn ivf_frame(pts: u64, payload: &[u8]) -> Vec<u8> {
        let mut f = Vec::new();
        f.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        f.extend_from_slice(&pts.to_le_bytes());
        f.extend_from_slice(payload);
        f
    }

    #[test]
    fn ivf_parser_splits_frames_across_chunk_boundaries() {
        let mut stream = ivf_header();
        stream.extend(ivf_frame(0, &[0x82, 1, 2, 3]));
        stream.extend(ivf_frame(1, &[0x86, 9]));

        let mut parser = IvfParser::new();
        let mut frames = Vec::new();
        // Feed one byte at a time to exercise every partial state.
        for b in stream {
            frames.extend(parser.push(&[b]).unwrap());
        }
        assert_eq!(frames, vec![vec![0x82, 1, 2, 3], vec![0x86, 9]]);
    }

    #[test]
    fn ivf_parser_rejects_wrong_magic() {
        let mut parser = IvfParser::new();
        // Partial header is fine, judgement is deferred.
        assert!(parser.push(b"RIF").unwrap().is_empty());
        assert!(parser.push(&vec![b'F'; IVF_HEADER_LEN]).is_err());
    }

    #[test]
    fn vp9_key_bit() {
        // profile 0, show_existing 0, frame_type 0 (key), show_frame 1
        assert!(vp9_is_keyframe(&[0x82]));
        // frame_type 1 (inter)
        assert!(!vp9_is_keyframe(&[0x86]));
        // show_existing_frame set
        assert!(!vp9_is_keyframe(&[0x88]));
        // bad frame marker
        assert!(!vp9_is_keyframe(&[0x02]));
        assert!(!vp9_is_keyframe(&[]));
    }

    fn adts_frame(total_len: usize) -> Vec<u8> {
        let mut f = vec![0u8; total_len];
        f[0] = 0xFF;
        f[1] = 0xF1; // MPEG-4, layer 0, no CRC
        f[2] = 0x4C; // AAC LC, 48 kHz index 3, channel cfg start
        f[3] = 0x80 | ((total_len >> 11) & 0x03) as u8;
        f[4] = ((total_len >> 3) & 0xFF) as u8;
        f[5] = (((total_len & 0x07) << 5) | 0x1F) as u8;
        f[6] = 0xFC;
        f
    }

    #[test]
    fn adts_parser_splits_frames() {
        let mut stream = adts_frame(20);
        stream.extend(adts_frame(31));

        let mut parser = AdtsParser::new();
        let a = parser.push(&stream[..25]).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].len(), 20);
        let b = parser.push(&stream[25..]).unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].len(), 31);
    }

    #[test]
    fn adts_header_fields() {
        let f = adts_frame(123);
        assert_eq!(adts_frame_len(&f), Some(123));
        assert_eq!(adts_sample_rate(&f), Some(48_000));
        assert_eq!(adts_frame_len(&[0u8; 7]), None);
    }

    #[test]
    fn adts_parser_rejects_garbage() {
        let mut parser = AdtsParser::new();
        assert!(parser.push(&[1, 2, 3, 4, 5, 6, 7]).is_err());
    }
}
