//! Clip encoding with the `ffmpeg` command-line tool.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::fs_storage::StorageLayout;
use super::process::{self, stderr_tail};
use super::{ClipRequest, Encoder, HourlyClips, Instance, InstanceKind, MediaFormat, Storage};
use crate::clock::{start_of_local_day, TimeRange};
use crate::config::EncoderConfig;
use crate::error::{Result, SkyreelError};
use crate::resource::Resource;

/// Frame rate of encoded clips.
const OUTPUT_FPS: u32 = 30;

/// Encoder that shells out to ffmpeg.
pub struct FfmpegEncoder {
    config: EncoderConfig,
    layout: StorageLayout,
    storage: Arc<dyn Storage>,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig, layout: StorageLayout, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            layout,
            storage,
        }
    }

    async fn ffmpeg(&self, args: &[String]) -> Result<()> {
        let output = process::run(&self.config.ffmpeg_path, args, self.config.timeout()).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SkyreelError::encoder(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr_tail(&output)
            )))
        }
    }

    async fn work_dir(&self, resource: &Resource) -> Result<PathBuf> {
        let dir = self.config.work_dir.join(&resource.storage_folder);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// The file at `path` if it is at least the minimum clip size.
    async fn usable(&self, path: &Path) -> Option<PathBuf> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() >= self.config.min_clip_bytes => Some(path.to_path_buf()),
            Ok(meta) => {
                tracing::warn!(
                    path = %path.display(),
                    bytes = meta.len(),
                    "Encoded clip too small, discarding"
                );
                None
            }
            Err(_) => None,
        }
    }
}

/// Concat demuxer script showing each image for an equal share of `length_secs`.
fn image_concat_script(instances: &[Instance], length_secs: u32) -> String {
    let per_frame = length_secs as f64 / instances.len().max(1) as f64;
    let mut script = String::from("ffconcat version 1.0\n");
    for instance in instances {
        let _ = writeln!(script, "file '{}'", escape(&instance.path));
        let _ = writeln!(script, "duration {:.4}", per_frame);
    }
    // The last entry's duration is ignored unless the file is repeated.
    if let Some(last) = instances.last() {
        let _ = writeln!(script, "file '{}'", escape(&last.path));
    }
    script
}

fn clip_concat_script(clips: &[PathBuf]) -> String {
    let mut script = String::from("ffconcat version 1.0\n");
    for clip in clips {
        let _ = writeln!(script, "file '{}'", escape(clip));
    }
    script
}

fn escape(path: &Path) -> String {
    path.display().to_string().replace('\'', "'\\''")
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn make_hourly_clip(
        &self,
        instances: &[Instance],
        resource: &Resource,
        request: &ClipRequest,
    ) -> Result<HourlyClips> {
        if instances.is_empty() {
            return Err(SkyreelError::encoder("no images to encode"));
        }

        let work = self.work_dir(resource).await?;
        let stem = format!("{}{}", resource.storage_folder, request.start.format("%Y%m%d-%H0000"));
        let script_path = work.join(format!("{}.ffconcat", stem));
        tokio::fs::write(&script_path, image_concat_script(instances, request.length_secs)).await?;

        let avi = work.join(format!("{}.avi", stem));
        let mp4 = work.join(format!("{}.mp4", stem));
        let script = script_path.display().to_string();
        let mut scale = String::new();
        if resource.image_width > 0 && resource.image_height > 0 {
            // Even dimensions are required by yuv420p.
            scale = format!(
                "scale={}:{},",
                resource.image_width / 2 * 2,
                resource.image_height / 2 * 2
            );
        }
        let filter = format!("{}fps={},format=yuv420p", scale, OUTPUT_FPS);

        let mut primary = args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"]);
        primary.extend([script.clone(), "-vf".into(), filter.clone()]);
        primary.extend(["-c:v".into(), request.codec.clone(), "-q:v".into(), "3".into()]);
        primary.push(avi.display().to_string());

        let mut compat = args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"]);
        compat.extend([script, "-vf".into(), filter]);
        compat.extend(args(["-c:v", "libx264", "-preset", "veryfast", "-movflags", "+faststart"]));
        compat.push(mp4.display().to_string());

        // Each artifact stands alone; one failed encode does not discard the other.
        if let Err(e) = self.ffmpeg(&primary).await {
            tracing::error!(resource = %resource.id, error = %e, "Primary clip encode failed");
        }
        if let Err(e) = self.ffmpeg(&compat).await {
            tracing::error!(resource = %resource.id, error = %e, "Compatibility clip encode failed");
        }
        let _ = tokio::fs::remove_file(&script_path).await;

        let range = TimeRange::hour_starting(request.start);
        let artifact = |path: PathBuf, format: MediaFormat| Instance {
            resource: resource.id,
            kind: InstanceKind::HourlyClip,
            format,
            range,
            path,
            low_quality: false,
        };

        Ok(HourlyClips {
            primary: self.usable(&avi).await.map(|p| artifact(p, MediaFormat::Avi)),
            compat: self.usable(&mp4).await.map(|p| artifact(p, MediaFormat::Mp4)),
        })
    }

    async fn make_day_long_clip(
        &self,
        resource: &Resource,
        end: DateTime<Utc>,
        include_low_quality: bool,
        reason: &str,
    ) -> Result<bool> {
        let tz = resource.time_zone;
        let start = start_of_local_day(end, tz);
        let local_end = end.with_timezone(&tz);

        let mut clips = Vec::new();
        let mut found = 0usize;
        let mut hour = start;
        while hour <= end {
            let local = hour.with_timezone(&tz).naive_local();
            let path = self
                .layout
                .hourly_clip_path(&resource.storage_folder, local, MediaFormat::Mp4);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                found += 1;
                clips.push(path);
            } else {
                clips.push(self.config.placeholder_clip.clone());
            }
            hour += Duration::hours(1);
        }

        if found == 0 {
            tracing::warn!(
                resource = %resource.id,
                reason,
                through_hour = local_end.hour(),
                "No hourly clips for day-long video"
            );
            return Ok(false);
        }

        let work = self.work_dir(resource).await?;
        let stem = format!("{}{}-daylong", resource.storage_folder, local_end.format("%Y%m%d"));
        let script_path = work.join(format!("{}.ffconcat", stem));
        tokio::fs::write(&script_path, clip_concat_script(&clips)).await?;
        let script = script_path.display().to_string();

        let standard = work.join(format!("{}.mp4", stem));
        let mut cmd = args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"]);
        cmd.push(script);
        cmd.extend(args(["-c:v", "libx264", "-preset", "veryfast", "-movflags", "+faststart"]));
        cmd.push(standard.display().to_string());
        let result = self.ffmpeg(&cmd).await;

        let low = work.join(format!("{}-low.mp4", stem));
        let low_result = if include_low_quality && result.is_ok() {
            let mut cmd = args(["-y", "-loglevel", "error", "-i"]);
            cmd.push(standard.display().to_string());
            cmd.extend(args(["-vf", "scale=trunc(iw/4)*2:trunc(ih/4)*2", "-c:v", "libx264", "-crf", "32"]));
            cmd.push(low.display().to_string());
            Some(self.ffmpeg(&cmd).await)
        } else {
            None
        };
        let _ = tokio::fs::remove_file(&script_path).await;
        result?;

        let day = TimeRange::new(start, end);
        let mut made = Vec::new();
        if let Some(path) = self.usable(&standard).await {
            made.push((path, false));
        }
        if let Some(Ok(())) = low_result {
            if let Some(path) = self.usable(&low).await {
                made.push((path, true));
            }
        }
        if made.is_empty() {
            return Err(SkyreelError::encoder("day-long clip produced no usable output"));
        }

        for (path, low_quality) in made {
            let instance = Instance {
                resource: resource.id,
                kind: InstanceKind::DayLongClip,
                format: MediaFormat::Mp4,
                range: day,
                path,
                low_quality,
            };
            self.storage.store(resource, &instance).await?;
        }

        tracing::info!(
            resource = %resource.id,
            reason,
            hours = clips.len(),
            missing = clips.len() - found,
            "Day-long clip stored"
        );
        Ok(true)
    }
}
