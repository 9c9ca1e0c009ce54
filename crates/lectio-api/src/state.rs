//! Shared application state.

use std::sync::Arc;

use lectio_anim::RefinerConfig;
use lectio_llm::{GeminiClient, LlmClient};
use lectio_pipeline::{
    AnalysisRepository, CleanupConfig, OutputCleanupService, PipelineConfig, VideoGenerator,
};
use lectio_store::{JobManager, StoreLayout};
use lectio_tts::{GeminiTtsEngine, TtsEngine};

/// Everything the handlers need, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: PipelineConfig,
    pub layout: StoreLayout,
    pub job_manager: Arc<JobManager>,
    pub llm: Arc<dyn LlmClient>,
    pub tts: Arc<dyn TtsEngine>,
    pub analysis_repo: Arc<AnalysisRepository>,
    pub generator: Arc<VideoGenerator>,
    pub cleanup: Arc<OutputCleanupService>,
}

impl AppState {
    /// Build state from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = PipelineConfig::from_env();
        let layout = config.store_layout();
        layout.ensure_dirs()?;
        std::fs::create_dir_all(&config.analysis_dir)?;

        let job_manager = Arc::new(JobManager::new(&config.job_data_dir, None)?);
        let llm: Arc<dyn LlmClient> = Arc::new(GeminiClient::from_env()?);
        let tts: Arc<dyn TtsEngine> = Arc::new(GeminiTtsEngine::from_env()?);
        let analysis_repo = Arc::new(AnalysisRepository::new(&config.analysis_dir));

        let generator = Arc::new(VideoGenerator::new(
            layout.clone(),
            Arc::clone(&llm),
            Arc::clone(&tts),
            RefinerConfig::from_env(),
            Arc::clone(&analysis_repo),
            config.section_parallelism,
        ));

        let cleanup = Arc::new(OutputCleanupService::new(
            layout.clone(),
            Arc::clone(&job_manager),
            CleanupConfig::from_env(),
        ));

        Ok(Self {
            config,
            layout,
            job_manager,
            llm,
            tts,
            analysis_repo,
            generator,
            cleanup,
        })
    }
}
