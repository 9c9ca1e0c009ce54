//! Per-section processing: audio first, then animation.
//!
//! The worker decides the TTS strategy (chunked whole-section, single
//! whole-section with pause splitting, or per-segment), produces exact
//! segment timings, then drives the animation refiner against the known
//! audio duration and muxes the result into `final_section.mp4`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use lectio_anim::{AnimationRefiner, SectionContext};
use lectio_media::{
    concatenate_audio, detect_silence_boundaries, get_duration, silence::proportional_durations,
    slice_audio, FfmpegCommand, FfmpegRunner,
};
use lectio_models::{
    Section, SectionMediaResult, SectionStatus, SegmentAudio, VideoMode,
};
use lectio_store::JobWorkspace;
use lectio_tts::{clean_narration_for_tts, join_segments_with_pauses, synthesize_with_fallback, TtsEngine};

use crate::error::{PipelineError, PipelineResult};

/// Whole-section synthesis goes chunked above this planned duration, and
/// only in comprehensive mode.
const CHUNKED_THRESHOLD_SECONDS: f64 = 120.0;
const CHUNK_COUNT: usize = 2;

pub struct SectionWorker {
    tts: Arc<dyn TtsEngine>,
    refiner: Arc<AnimationRefiner>,
    workspace: JobWorkspace,
    voice: String,
    language: String,
}

impl SectionWorker {
    pub fn new(
        tts: Arc<dyn TtsEngine>,
        refiner: Arc<AnimationRefiner>,
        workspace: JobWorkspace,
        voice: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            tts,
            refiner,
            workspace,
            voice: voice.into(),
            language: language.into(),
        }
    }

    /// Process one section end to end.
    pub async fn process(
        &self,
        section: &Section,
        index: usize,
        video_mode: VideoMode,
    ) -> PipelineResult<SectionMediaResult> {
        let section_dir = self.workspace.section_dir(index);
        tokio::fs::create_dir_all(&section_dir).await?;
        self.write_status(index, SectionStatus::phase("audio")).await;

        let segments = section.effective_segments();
        let (segment_audio, total_duration) = self
            .generate_audio(section, &segments, index, video_mode)
            .await;

        let audio_path = self.workspace.section_audio_path(index);
        if segment_audio.is_empty() || !audio_path.exists() {
            self.write_status(
                index,
                SectionStatus {
                    phase: "failed".into(),
                    message: "audio synthesis produced nothing".into(),
                    ..Default::default()
                },
            )
            .await;
            return Err(PipelineError::section_failed(
                index,
                "audio synthesis produced no usable output",
            ));
        }

        self.write_status(
            index,
            SectionStatus {
                phase: "animation".into(),
                audio_ready: true,
                ..Default::default()
            },
        )
        .await;

        // Animation against the measured audio duration.
        let ctx = SectionContext {
            section: section.clone(),
            section_index: index,
            segments: segment_audio.clone(),
            audio_duration: total_duration,
            section_dir: section_dir.clone(),
            language: self.language.clone(),
        };
        let animation = self
            .refiner
            .generate(&ctx)
            .await
            .map_err(|e| PipelineError::section_failed(index, e.to_string()))?;

        // Mux scene video with the section audio.
        self.write_status(
            index,
            SectionStatus {
                phase: "mux".into(),
                audio_ready: true,
                ..Default::default()
            },
        )
        .await;
        let final_path = self.workspace.section_video_path(index);
        mux_video_audio(&animation.video_path, &audio_path, &final_path).await?;

        self.write_status(
            index,
            SectionStatus {
                phase: "done".into(),
                audio_ready: true,
                video_ready: true,
                ..Default::default()
            },
        )
        .await;

        info!(
            section = index,
            duration = total_duration,
            video = %final_path.display(),
            "Section complete"
        );
        Ok(SectionMediaResult {
            video_path: Some(final_path),
            audio_path: Some(audio_path),
            segments: segment_audio,
            total_duration,
        })
    }

    /// Pick and run the synthesis strategy. Failures cascade: chunked →
    /// single whole-section → per-segment with placeholder fallback.
    async fn generate_audio(
        &self,
        section: &Section,
        segments: &[lectio_models::NarrationSegment],
        index: usize,
        video_mode: VideoMode,
    ) -> (Vec<SegmentAudio>, f64) {
        let section_dir = self.workspace.section_dir(index);
        let audio_path = self.workspace.section_audio_path(index);

        if self.tts.whole_section_tts() {
            if should_use_chunked(video_mode, segments) {
                match self
                    .generate_audio_chunked(segments, &section_dir, &audio_path)
                    .await
                {
                    Ok(result) => return result,
                    Err(e) => {
                        warn!(section = index, error = %e, "Chunked synthesis failed, falling back to single call");
                    }
                }
            }
            // A whole-section engine that yields nothing is a section
            // failure; the caller surfaces it.
            let (info, total) = self
                .generate_audio_whole_section(segments, &section_dir, &audio_path)
                .await;
            if info.is_empty() {
                warn!(section = index, "Whole-section synthesis yielded nothing");
            }
            return (info, total);
        }

        self.generate_audio_per_segment(segments, &section_dir, &audio_path)
            .await
            .unwrap_or_else(|e| {
                warn!(section = index, error = %e, "Per-segment synthesis failed");
                (Vec::new(), 0.0)
            })
    }

    /// One synthesis call for the whole section with pause markers between
    /// segments; timings recovered from detected silences, proportional
    /// fallback otherwise. Returns empty info on synthesis failure.
    async fn generate_audio_whole_section(
        &self,
        segments: &[lectio_models::NarrationSegment],
        section_dir: &PathBuf,
        audio_path: &PathBuf,
    ) -> (Vec<SegmentAudio>, f64) {
        let cleaned: Vec<String> = segments
            .iter()
            .map(|s| clean_narration_for_tts(&s.text))
            .collect();
        let joined = join_segments_with_pauses(
            &segments.iter().map(|s| s.text.clone()).collect::<Vec<_>>(),
        );

        let synthesized = self
            .tts
            .synthesize(&joined, audio_path, &self.voice)
            .await;
        let total = match synthesized {
            Ok(duration) => get_duration(audio_path).await.unwrap_or(duration),
            Err(e) => {
                warn!(error = %e, "Whole-section TTS call failed");
                return (Vec::new(), 0.0);
            }
        };
        if total <= 0.0 {
            return (Vec::new(), 0.0);
        }

        if cleaned.len() == 1 {
            return (
                vec![SegmentAudio {
                    segment_index: 0,
                    text: cleaned[0].clone(),
                    audio_path: Some(audio_path.clone()),
                    duration: total,
                    start_time: 0.0,
                    end_time: total,
                }],
                total,
            );
        }

        // Pause detection: accept only when at least N-1 silences exist.
        let pauses = detect_silence_boundaries(audio_path)
            .await
            .unwrap_or_default();
        if pauses.len() >= cleaned.len() - 1 {
            let splits: Vec<f64> = pauses[..cleaned.len() - 1].to_vec();
            match self
                .split_at_pauses(&cleaned, audio_path, section_dir, &splits, total)
                .await
            {
                Ok(info) => return (info, total),
                Err(e) => warn!(error = %e, "Pause splitting failed, using proportional timings"),
            }
        }

        // Proportional distribution by character count; sums exactly.
        let durations = proportional_durations(&cleaned, total);
        let mut info = Vec::new();
        let mut cursor = 0.0;
        for (i, (text, duration)) in cleaned.iter().zip(durations).enumerate() {
            info.push(SegmentAudio {
                segment_index: i,
                text: text.clone(),
                audio_path: None,
                duration,
                start_time: cursor,
                end_time: cursor + duration,
            });
            cursor += duration;
        }
        (info, total)
    }

    async fn split_at_pauses(
        &self,
        texts: &[String],
        audio_path: &PathBuf,
        section_dir: &PathBuf,
        splits: &[f64],
        total: f64,
    ) -> PipelineResult<Vec<SegmentAudio>> {
        let mut info = Vec::new();
        let mut start = 0.0;
        for (i, text) in texts.iter().enumerate() {
            let end = splits.get(i).copied().unwrap_or(total);
            let seg_path = section_dir.join(format!("seg_{i}.mp3"));
            slice_audio(audio_path, &seg_path, start, end).await?;
            info.push(SegmentAudio {
                segment_index: i,
                text: text.clone(),
                audio_path: Some(seg_path),
                duration: end - start,
                start_time: start,
                end_time: end,
            });
            start = end;
        }
        Ok(info)
    }

    /// Two contiguous whole-section calls stitched back together, with
    /// timings renormalized to the measured stitched total.
    async fn generate_audio_chunked(
        &self,
        segments: &[lectio_models::NarrationSegment],
        section_dir: &PathBuf,
        audio_path: &PathBuf,
    ) -> PipelineResult<(Vec<SegmentAudio>, f64)> {
        let chunks = split_into_contiguous_chunks(segments, CHUNK_COUNT);

        let mut chunk_audio_paths = Vec::new();
        let mut merged: Vec<SegmentAudio> = Vec::new();
        for (c, chunk) in chunks.iter().enumerate() {
            let chunk_dir = section_dir.join(format!("chunk_{c}"));
            tokio::fs::create_dir_all(&chunk_dir).await?;
            let chunk_audio = chunk_dir.join("section_audio.mp3");
            let (info, chunk_total) = self
                .generate_audio_whole_section(chunk, &chunk_dir, &chunk_audio)
                .await;
            if info.is_empty() || chunk_total <= 0.0 {
                return Err(PipelineError::section_failed(
                    c,
                    "chunked synthesis produced an empty chunk",
                ));
            }
            chunk_audio_paths.push(chunk_audio);
            merged.extend(info);
        }

        concatenate_audio(&chunk_audio_paths, audio_path).await?;
        let stitched_total = get_duration(audio_path)
            .await
            .unwrap_or_else(|_| merged.iter().map(|s| s.duration).sum());

        let normalized = normalize_timings_to_total(merged, stitched_total);
        Ok((normalized, stitched_total))
    }

    /// One synthesis call per segment; provider failures degrade to
    /// placeholder silence so timings always materialize.
    async fn generate_audio_per_segment(
        &self,
        segments: &[lectio_models::NarrationSegment],
        section_dir: &PathBuf,
        audio_path: &PathBuf,
    ) -> PipelineResult<(Vec<SegmentAudio>, f64)> {
        let mut info = Vec::new();
        let mut seg_paths = Vec::new();
        let mut cursor = 0.0;

        for (i, segment) in segments.iter().enumerate() {
            let text = clean_narration_for_tts(&segment.text);
            let seg_path = section_dir.join(format!("seg_{i}.mp3"));
            let duration =
                synthesize_with_fallback(self.tts.as_ref(), &text, &seg_path, &self.voice).await;
            info.push(SegmentAudio {
                segment_index: i,
                text,
                audio_path: Some(seg_path.clone()),
                duration,
                start_time: cursor,
                end_time: cursor + duration,
            });
            seg_paths.push(seg_path);
            cursor += duration;
        }

        concatenate_audio(&seg_paths, audio_path).await?;
        Ok((info, cursor))
    }

    async fn write_status(&self, index: usize, status: SectionStatus) {
        let path = self.workspace.section_status_path(index);
        if let Err(e) = lectio_store::atomic::write_json_atomic(&path, &status) {
            warn!(section = index, error = %e, "Failed to write section status");
        }
    }
}

/// Chunked whole-section synthesis policy.
pub fn should_use_chunked(
    video_mode: VideoMode,
    segments: &[lectio_models::NarrationSegment],
) -> bool {
    let total: f64 = segments.iter().map(|s| s.estimated_duration).sum();
    video_mode == VideoMode::Comprehensive && total >= CHUNKED_THRESHOLD_SECONDS
}

/// Split segments into `chunk_count` contiguous chunks balanced by
/// estimated duration. Order is preserved.
pub fn split_into_contiguous_chunks(
    segments: &[lectio_models::NarrationSegment],
    chunk_count: usize,
) -> Vec<Vec<lectio_models::NarrationSegment>> {
    if segments.is_empty() || chunk_count <= 1 {
        return vec![segments.to_vec()];
    }
    let total: f64 = segments.iter().map(|s| s.estimated_duration).sum();
    let target = total / chunk_count as f64;

    let mut chunks: Vec<Vec<lectio_models::NarrationSegment>> = Vec::new();
    let mut current: Vec<lectio_models::NarrationSegment> = Vec::new();
    let mut accumulated = 0.0;

    for segment in segments {
        let is_last_chunk = chunks.len() == chunk_count - 1;
        if !is_last_chunk && accumulated >= target && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            accumulated = 0.0;
        }
        accumulated += segment.estimated_duration;
        current.push(segment.clone());
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Redistribute `stitched_total` across segments proportionally to their
/// measured durations, recomputing contiguous start/end times and
/// sequential indices. The last segment lands exactly on the total.
pub fn normalize_timings_to_total(
    segments: Vec<SegmentAudio>,
    stitched_total: f64,
) -> Vec<SegmentAudio> {
    let measured: f64 = segments.iter().map(|s| s.duration).sum();
    if measured <= 0.0 || segments.is_empty() {
        return segments;
    }

    let count = segments.len();
    let mut out = Vec::with_capacity(count);
    let mut cursor = 0.0;
    for (i, mut segment) in segments.into_iter().enumerate() {
        let share = segment.duration / measured;
        let duration = if i == count - 1 {
            stitched_total - cursor
        } else {
            stitched_total * share
        };
        segment.segment_index = i;
        segment.duration = duration;
        segment.start_time = cursor;
        segment.end_time = cursor + duration;
        cursor += duration;
        out.push(segment);
    }
    out
}

/// Mux a silent scene video with the section audio track.
pub async fn mux_video_audio(
    video: &PathBuf,
    audio: &PathBuf,
    output: &PathBuf,
) -> PipelineResult<()> {
    let cmd = FfmpegCommand::without_input(output)
        .input_args([
            "-i",
            &video.to_string_lossy(),
            "-i",
            &audio.to_string_lossy(),
        ])
        .output_args(["-c:v", "copy", "-c:a", "aac", "-shortest"]);
    FfmpegRunner::new().run(&cmd).await?;
    if !output.exists() {
        return Err(PipelineError::CompositeFailed(format!(
            "mux produced no output at {}",
            output.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectio_models::NarrationSegment;

    fn segment(text: &str, duration: f64) -> NarrationSegment {
        NarrationSegment {
            text: text.into(),
            estimated_duration: duration,
        }
    }

    #[test]
    fn test_chunked_policy() {
        let long = vec![segment("a", 60.0), segment("b", 60.0)];
        assert!(should_use_chunked(VideoMode::Comprehensive, &long));
        assert!(!should_use_chunked(VideoMode::Overview, &long));

        let short = vec![segment("a", 60.0), segment("b", 59.8)];
        assert!(!should_use_chunked(VideoMode::Comprehensive, &short));
    }

    #[test]
    fn test_contiguous_chunks_preserve_order() {
        let segments = vec![
            segment("s1", 30.0),
            segment("s2", 20.0),
            segment("s3", 20.0),
            segment("s4", 30.0),
        ];
        let chunks = split_into_contiguous_chunks(&segments, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(chunks[1].len(), 2);
        let flattened: Vec<String> = chunks
            .iter()
            .flatten()
            .map(|s| s.text.clone())
            .collect();
        assert_eq!(flattened, vec!["s1", "s2", "s3", "s4"]);
    }

    #[test]
    fn test_single_chunk_for_trivial_inputs() {
        let segments = vec![segment("only", 10.0)];
        let chunks = split_into_contiguous_chunks(&segments, 2);
        assert_eq!(chunks.iter().flatten().count(), 1);
    }

    #[test]
    fn test_normalize_timings_to_total() {
        let segments = vec![
            SegmentAudio {
                segment_index: 0,
                text: "A".into(),
                audio_path: None,
                duration: 2.0,
                start_time: 0.0,
                end_time: 2.0,
            },
            SegmentAudio {
                segment_index: 1,
                text: "B".into(),
                audio_path: None,
                duration: 3.0,
                start_time: 2.0,
                end_time: 5.0,
            },
            SegmentAudio {
                segment_index: 0,
                text: "C".into(),
                audio_path: None,
                duration: 5.0,
                start_time: 0.0,
                end_time: 5.0,
            },
        ];
        let normalized = normalize_timings_to_total(segments, 20.0);
        assert_eq!(normalized.len(), 3);
        assert!((normalized[0].start_time - 0.0).abs() < 1e-9);
        assert!((normalized[0].end_time - 4.0).abs() < 1e-9);
        assert!((normalized[1].start_time - 4.0).abs() < 1e-9);
        assert!((normalized[1].end_time - 10.0).abs() < 1e-9);
        assert!((normalized[2].start_time - 10.0).abs() < 1e-9);
        assert!((normalized[2].end_time - 20.0).abs() < 1e-9);
        // Reindexed sequentially after merging chunks
        assert_eq!(normalized[2].segment_index, 2);
    }

    #[test]
    fn test_normalize_sums_exactly_to_total() {
        let segments: Vec<SegmentAudio> = (0..7)
            .map(|i| SegmentAudio {
                segment_index: i,
                text: format!("s{i}"),
                audio_path: None,
                duration: 1.3,
                start_time: 0.0,
                end_time: 0.0,
            })
            .collect();
        let normalized = normalize_timings_to_total(segments, 33.33);
        let sum: f64 = normalized.iter().map(|s| s.duration).sum();
        assert!((sum - 33.33).abs() < 1e-9);
        assert!((normalized.last().unwrap().end_time - 33.33).abs() < 1e-9);
    }
}
