//! On-disk layout for jobs, uploads, and outputs.
//!
//! All paths flow through here so the layout has one authority. Section
//! directories are index-based; `section_<id>` and `merged_<i>.mp4`
//! locations from earlier layouts are still readable.

use std::path::{Path, PathBuf};

/// Root directories the service operates on.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub outputs_root: PathBuf,
    pub uploads_root: PathBuf,
    pub job_data_root: PathBuf,
}

impl StoreLayout {
    pub fn new(
        outputs_root: impl Into<PathBuf>,
        uploads_root: impl Into<PathBuf>,
        job_data_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            outputs_root: outputs_root.into(),
            uploads_root: uploads_root.into(),
            job_data_root: job_data_root.into(),
        }
    }

    /// Ensure all roots exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.outputs_root)?;
        std::fs::create_dir_all(&self.uploads_root)?;
        std::fs::create_dir_all(&self.job_data_root)?;
        Ok(())
    }

    pub fn job_workspace(&self, job_id: &str) -> JobWorkspace {
        JobWorkspace {
            job_dir: self.outputs_root.join(job_id),
        }
    }

    /// The job manager's record file for a job.
    pub fn job_record_path(&self, job_id: &str) -> PathBuf {
        self.job_data_root.join(format!("{job_id}.json"))
    }

    /// Locate an uploaded file by id, trying known extensions.
    pub fn find_upload(&self, file_id: &str) -> Option<PathBuf> {
        const EXTENSIONS: &[&str] = &[".pdf", ".png", ".jpg", ".jpeg", ".txt", ".md"];
        for ext in EXTENSIONS {
            let candidate = self.uploads_root.join(format!("{file_id}{ext}"));
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }
}

/// The per-job workspace under `outputs_root/<job_id>/`.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    pub job_dir: PathBuf,
}

impl JobWorkspace {
    pub fn new(job_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_dir: job_dir.into(),
        }
    }

    pub fn script_path(&self) -> PathBuf {
        self.job_dir.join("script.json")
    }

    pub fn sections_dir(&self) -> PathBuf {
        self.job_dir.join("sections")
    }

    pub fn section_dir(&self, index: usize) -> PathBuf {
        self.sections_dir().join(index.to_string())
    }

    /// Candidate section directories, index-based first, then the legacy
    /// id-based location.
    pub fn section_dir_candidates(&self, index: usize, section_id: &str) -> Vec<PathBuf> {
        let mut candidates = vec![self.section_dir(index)];
        if !section_id.is_empty() {
            candidates.push(self.sections_dir().join(section_id));
        }
        candidates
    }

    pub fn section_audio_path(&self, index: usize) -> PathBuf {
        self.section_dir(index).join("section_audio.mp3")
    }

    pub fn scene_file_path(&self, index: usize) -> PathBuf {
        self.section_dir(index).join(format!("scene_{index}.py"))
    }

    pub fn section_video_path(&self, index: usize) -> PathBuf {
        self.section_dir(index).join("final_section.mp4")
    }

    /// Legacy location for a finished section video.
    pub fn legacy_section_video_path(&self, index: usize) -> PathBuf {
        self.sections_dir().join(format!("merged_{index}.mp4"))
    }

    /// The finished video for a section, if present in any known location.
    pub fn find_section_video(&self, index: usize) -> Option<PathBuf> {
        let preferred = self.section_video_path(index);
        if preferred.exists() {
            return Some(preferred);
        }
        let legacy = self.legacy_section_video_path(index);
        if legacy.exists() {
            return Some(legacy);
        }
        None
    }

    pub fn choreography_plan_path(&self, index: usize) -> PathBuf {
        self.section_dir(index).join("choreography_plan.json")
    }

    pub fn visual_script_path(&self, index: usize) -> PathBuf {
        self.section_dir(index)
            .join(format!("visual_script_{index}.json"))
    }

    pub fn section_status_path(&self, index: usize) -> PathBuf {
        self.section_dir(index).join("status.json")
    }

    pub fn concat_list_path(&self) -> PathBuf {
        self.job_dir.join("concat_list.txt")
    }

    pub fn final_video_path(&self) -> PathBuf {
        self.job_dir.join("final_video.mp4")
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.job_dir.join("thumbnail.jpg")
    }

    pub fn video_info_path(&self) -> PathBuf {
        self.job_dir.join("video_info.json")
    }

    pub fn translations_dir(&self) -> PathBuf {
        self.job_dir.join("translations")
    }

    /// Entries kept by keep-only-final cleanup and the success-path prune.
    pub fn is_protected_entry(name: &str) -> bool {
        matches!(
            name,
            "final_video.mp4" | "video_info.json" | "thumbnail.jpg" | "translations"
        )
    }
}

impl AsRef<Path> for JobWorkspace {
    fn as_ref(&self) -> &Path {
        &self.job_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = StoreLayout::new("/tmp/out", "/tmp/up", "/tmp/jobs");
        let ws = layout.job_workspace("abc");
        assert_eq!(ws.script_path(), PathBuf::from("/tmp/out/abc/script.json"));
        assert_eq!(
            ws.section_audio_path(2),
            PathBuf::from("/tmp/out/abc/sections/2/section_audio.mp3")
        );
        assert_eq!(
            ws.legacy_section_video_path(2),
            PathBuf::from("/tmp/out/abc/sections/merged_2.mp4")
        );
        assert_eq!(
            layout.job_record_path("abc"),
            PathBuf::from("/tmp/jobs/abc.json")
        );
    }

    #[test]
    fn test_find_section_video_prefers_current_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::new(tmp.path());
        std::fs::create_dir_all(ws.section_dir(0)).unwrap();
        std::fs::write(ws.legacy_section_video_path(0), b"legacy").unwrap();
        assert_eq!(
            ws.find_section_video(0),
            Some(ws.legacy_section_video_path(0))
        );

        std::fs::write(ws.section_video_path(0), b"current").unwrap();
        assert_eq!(ws.find_section_video(0), Some(ws.section_video_path(0)));
    }

    #[test]
    fn test_protected_entries() {
        assert!(JobWorkspace::is_protected_entry("final_video.mp4"));
        assert!(JobWorkspace::is_protected_entry("translations"));
        assert!(!JobWorkspace::is_protected_entry("script.json"));
        assert!(!JobWorkspace::is_protected_entry("sections"));
    }

    #[test]
    fn test_find_upload() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(
            tmp.path().join("out"),
            tmp.path().join("up"),
            tmp.path().join("jobs"),
        );
        layout.ensure_dirs().unwrap();
        std::fs::write(layout.uploads_root.join("f1.pdf"), b"pdf").unwrap();
        assert!(layout.find_upload("f1").is_some());
        assert!(layout.find_upload("missing").is_none());
    }
}
