use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use obsede_core::storage::AudioEncoder;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

// The speech model returns 16-bit little-endian mono PCM at 24 kHz.
pub const GEMINI_TTS_PCM16_SAMPLE_RATE: u32 = 24000;
pub const PCM16_CHANNELS: u16 = 1;
pub const PCM16_BITS_PER_SAMPLE: u16 = 16;

/// Decodes one base64 `inlineData` fragment into raw PCM bytes.
pub fn decode_pcm_base64(base64_fragment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(base64_fragment)
}

/// Playback length of a PCM16 mono buffer, in seconds.
pub fn pcm16_duration_secs(pcm_len: usize, sample_rate: u32) -> f64 {
    (pcm_len / 2) as f64 / sample_rate as f64
}

/// Wraps raw PCM16 mono samples in a canonical 44-byte RIFF/WAVE header.
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    // A trailing odd byte is not a full sample.
    let data = &pcm[..pcm.len() - pcm.len() % 2];
    let data_len = data.len() as u32;
    let block_align = PCM16_CHANNELS * PCM16_BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * block_align as u32;

    let mut wav = Vec::with_capacity(44 + data.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&PCM16_CHANNELS.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&PCM16_BITS_PER_SAMPLE.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(data);
    wav
}

/// Writes the episode audio as WAV, then transcodes it to MP3 with `ffmpeg`.
///
/// When `ffmpeg` is missing or fails, the WAV file is kept and returned instead.
pub struct FfmpegEncoder {
    out_dir: PathBuf,
    ffmpeg: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }

    /// Uses a specific `ffmpeg` executable.
    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    async fn transcode(&self, wav: &Path, mp3: &Path) -> Result<()> {
        let output = Command::new(&self.ffmpeg)
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(wav)
            .args(["-codec:a", "libmp3lame", "-b:a", "128k"])
            .arg(mp3)
            .output()
            .await
            .with_context(|| format!("Failed to start {}", self.ffmpeg.display()))?;
        if !output.status.success() {
            anyhow::bail!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl AudioEncoder for FfmpegEncoder {
    async fn encode(&self, pcm: Vec<u8>, stem: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.out_dir.display()))?;
        let wav_path = self.out_dir.join(format!("{stem}.wav"));
        let mp3_path = self.out_dir.join(format!("{stem}.mp3"));

        info!(
            seconds = pcm16_duration_secs(pcm.len(), GEMINI_TTS_PCM16_SAMPLE_RATE),
            "Writing episode audio"
        );
        tokio::fs::write(&wav_path, pcm16_to_wav(&pcm, GEMINI_TTS_PCM16_SAMPLE_RATE))
            .await
            .with_context(|| format!("Failed to write {}", wav_path.display()))?;

        match self.transcode(&wav_path, &mp3_path).await {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(&wav_path).await {
                    warn!(path = %wav_path.display(), error = %e, "Could not remove intermediate WAV");
                }
                info!(path = %mp3_path.display(), "Audio transcoded to MP3");
                Ok(mp3_path)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "MP3 transcoding unavailable, publishing WAV");
                Ok(wav_path)
            }
        }
    }
}
