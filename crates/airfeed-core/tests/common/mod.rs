#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use airfeed_core::{DatasetSource, FetchError, FetchOutcome};
use async_trait::async_trait;

pub const SAMPLE_HEADER: &str = "ident,type,name,latitude_deg,longitude_deg,elevation_ft,continent,iso_country,iso_region,municipality,scheduled_service,icao_code,iata_code,gps_code,local_code";

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).expect("read fixture")
}

pub fn read_rows(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("open csv");
    let header = reader
        .headers()
        .expect("header")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.expect("row").iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

/// Files left in `dir`, sorted.
pub fn list_dir(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// What a scripted fetch should do.
#[derive(Debug, Clone)]
pub enum Step {
    Serve(String),
    Fail,
}

/// Source that plays back a fixed script, one step per fetch, and records
/// the published file's contents as seen at the start of every fetch.
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    published_path: PathBuf,
    observed: Mutex<Vec<Option<String>>>,
    on_fetch: Box<dyn Fn(usize) + Send + Sync>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>, published_path: &Path) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            published_path: published_path.to_path_buf(),
            observed: Mutex::new(Vec::new()),
            on_fetch: Box::new(|_| {}),
        }
    }

    /// Call `hook` with the 1-based fetch number before each fetch.
    pub fn with_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_fetch = Box::new(hook);
        self
    }

    pub fn observed(&self) -> Vec<Option<String>> {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatasetSource for ScriptedSource {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn fetch_to(&self, dest: &Path) -> Result<FetchOutcome, FetchError> {
        let call = {
            let mut observed = self.observed.lock().unwrap();
            observed.push(std::fs::read_to_string(&self.published_path).ok());
            observed.len()
        };
        (self.on_fetch)(call);

        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Fail);
        match step {
            Step::Serve(body) => {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(dest, &body).map_err(|source| FetchError::Write {
                    path: dest.to_path_buf(),
                    source,
                })?;
                Ok(FetchOutcome {
                    bytes_written: body.len() as u64,
                })
            }
            Step::Fail => Err(FetchError::Timeout {
                url: "scripted://source".to_string(),
            }),
        }
    }
}
