use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use report_finder_lib::{run_batch, BatchProgress, FinderSettings, ResultTable};
use report_finder_lib::progress::ProgressLog;

const LOG_CAPACITY: usize = 50;
/// How long a finished job stays downloadable.
const JOB_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

#[derive(Clone, serde::Serialize)]
pub struct JobStatus {
    pub id: String,
    pub status: JobState,
    pub total_records: usize,
    pub processed_count: usize,
    pub fraction: f64,
    pub current_company: String,
    pub logs: ProgressLog,
    /// Filled as companies finish; exported once the job completes.
    pub records: ResultTable,
    #[serde(skip)]
    finished_at: Option<Instant>,
}

impl JobStatus {
    fn queued(id: &str, total: usize) -> Self {
        let mut logs = ProgressLog::with_capacity(LOG_CAPACITY);
        logs.push(format!("Loaded {} companies.", total));
        JobStatus {
            id: id.to_string(),
            status: JobState::Queued,
            total_records: total,
            processed_count: 0,
            fraction: 0.0,
            current_company: String::new(),
            logs,
            records: ResultTable::new(),
            finished_at: None,
        }
    }

    fn apply_progress(&mut self, progress: &BatchProgress) {
        self.status = JobState::Processing;
        self.processed_count = progress.processed;
        self.fraction = progress.fraction();
        self.current_company = progress.company.clone();
        self.logs.push(progress.status_line.clone());
        self.records.push(progress.record.clone());
    }
}

type JobMap = HashMap<String, JobStatus>;

pub struct JobManager {
    jobs: Arc<Mutex<JobMap>>,
    retention: Duration,
}

fn lock(jobs: &Mutex<JobMap>) -> MutexGuard<'_, JobMap> {
    jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl JobManager {
    pub fn new() -> Self {
        Self::with_retention(JOB_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        JobManager {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            retention,
        }
    }

    /// Drops completed and failed jobs older than the retention window.
    pub fn prune(&self) -> usize {
        let mut jobs = lock(&self.jobs);
        let before = jobs.len();
        jobs.retain(|_, job| {
            job.finished_at
                .map_or(true, |finished| finished.elapsed() < self.retention)
        });
        let evicted = before - jobs.len();
        if evicted > 0 {
            log::info!("Evicted {} finished job(s).", evicted);
        }
        evicted
    }

    /// Runs the batch on its own thread. `settings` must already be validated;
    /// they are dropped with the thread and never stored on the job.
    pub fn start_job(&self, job_id: String, settings: FinderSettings, companies: Vec<String>) -> String {
        self.prune();
        lock(&self.jobs).insert(job_id.clone(), JobStatus::queued(&job_id, companies.len()));

        let jobs_arc = self.jobs.clone();
        let id_clone = job_id.clone();

        thread::spawn(move || {
            Self::run_job(id_clone, jobs_arc, settings, companies);
        });

        job_id
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        lock(&self.jobs).get(job_id).cloned()
    }

    /// CSV bytes of a completed job. `Err(state)` while the job is unfinished.
    pub fn export(&self, job_id: &str) -> Option<Result<Vec<u8>, JobState>> {
        let guard = lock(&self.jobs);
        let job = guard.get(job_id)?;
        match job.status {
            JobState::Completed => Some(job.records.to_csv_bytes().map_err(|e| {
                log::error!("Failed to export job {}: {}", job_id, e);
                JobState::Failed
            })),
            state => Some(Err(state)),
        }
    }

    fn run_job(job_id: String, jobs: Arc<Mutex<JobMap>>, settings: FinderSettings, companies: Vec<String>) {
        let update = |f: &dyn Fn(&mut JobStatus)| {
            if let Some(job) = lock(&jobs).get_mut(&job_id) {
                f(job);
            }
        };

        update(&|job: &mut JobStatus| job.status = JobState::Processing);

        let result = run_batch(&settings, &companies, |progress| {
            update(&|job: &mut JobStatus| job.apply_progress(progress));
        });

        match result {
            Ok(table) => {
                log::info!("Job {} finished with {} records.", job_id, table.len());
                update(&|job: &mut JobStatus| {
                    job.status = JobState::Completed;
                    job.finished_at = Some(Instant::now());
                    job.current_company = "Done".to_string();
                    job.logs.push("All records processed.");
                });
            }
            Err(e) => {
                log::error!("Job {} failed: {}", job_id, e);
                update(&|job: &mut JobStatus| {
                    job.status = JobState::Failed;
                    job.finished_at = Some(Instant::now());
                    job.logs.push(format!("Job failed: {}", e));
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_until_done(manager: &JobManager, id: &str) -> JobStatus {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let status = manager.status(id).unwrap();
            if matches!(status.status, JobState::Completed | JobState::Failed) || Instant::now() > deadline {
                return status;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_unknown_job() {
        let manager = JobManager::new();
        assert!(manager.status("nope").is_none());
        assert!(manager.export("nope").is_none());
    }

    #[test]
    fn test_job_with_unreachable_provider_completes_with_errors() {
        let manager = JobManager::new();
        let settings = FinderSettings {
            api_key: "test-key".to_string(),
            serpapi_endpoint: "http://127.0.0.1:1/search.json".to_string(),
            delay_ms: 0,
            ..FinderSettings::default()
        };
        let id = manager.start_job(
            "job-1".to_string(),
            settings,
            vec!["Acme".to_string(), "Globex".to_string()],
        );

        let status = wait_until_done(&manager, &id);
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.processed_count, 2);
        assert_eq!(status.fraction, 1.0);
        assert_eq!(status.records.len(), 2);

        let csv = manager.export(&id).unwrap().unwrap();
        let text = String::from_utf8(csv).unwrap();
        assert!(text.starts_with("Company,Official Website,Annual Report URL,Status"));
        assert_eq!(text.lines().count(), 3);
        assert!(!text.contains("test-key"));
    }

    #[test]
    fn test_job_without_credentials_fails() {
        let manager = JobManager::new();
        let id = manager.start_job("job-2".to_string(), FinderSettings::default(), vec!["Acme".to_string()]);

        let status = wait_until_done(&manager, &id);
        assert_eq!(status.status, JobState::Failed);
        assert!(matches!(manager.export(&id), Some(Err(JobState::Failed))));
    }

    #[test]
    fn test_records_serialize_as_list() {
        let status = JobStatus::queued("job-3", 1);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["records"], serde_json::json!([]));
        assert!(json.get("finished_at").is_none());
    }

    #[test]
    fn test_finished_jobs_are_evicted() {
        let manager = JobManager::with_retention(Duration::ZERO);
        let first = manager.start_job("job-4".to_string(), FinderSettings::default(), vec!["Acme".to_string()]);
        assert_eq!(wait_until_done(&manager, &first).status, JobState::Failed);

        let second = manager.start_job("job-5".to_string(), FinderSettings::default(), vec!["Acme".to_string()]);
        assert!(manager.status(&first).is_none());
        assert!(manager.export(&first).is_none());
        assert!(manager.status(&second).is_some());
    }

    #[test]
    fn test_unfinished_jobs_survive_pruning() {
        let manager = JobManager::with_retention(Duration::ZERO);
        let settings = FinderSettings {
            api_key: "test-key".to_string(),
            serpapi_endpoint: "http://127.0.0.1:1/search.json".to_string(),
            delay_ms: 60_000,
            ..FinderSettings::default()
        };
        let id = manager.start_job(
            "job-6".to_string(),
            settings,
            vec!["Acme".to_string(), "Globex".to_string()],
        );
        assert_eq!(manager.prune(), 0);
        assert!(manager.status(&id).is_some());
    }
}
