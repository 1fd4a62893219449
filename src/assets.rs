use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// A logical image with several possible on-disk locations, tried in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetRef {
    pub key: &'static str,
    pub candidates: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct Config {
    pub roots: Vec<PathBuf>,
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
            workers: 2,
        }
    }
}

/// Outcome of probing an asset. `path: None` means no candidate loaded;
/// callers degrade to a missing-state render, never an error.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub key: &'static str,
    pub path: Option<PathBuf>,
}

struct Job {
    key: &'static str,
    candidates: Vec<String>,
    tx: Sender<Resolution>,
}

struct Inner {
    cfg: Config,
    resolved: Mutex<HashMap<&'static str, Option<PathBuf>>>,
    jobs: Sender<Job>,
    stop: Sender<()>,
}

/// Probes which candidate path serves each asset, at most once per asset
/// per session. Probes run on worker threads and report over a channel.
pub struct Resolver {
    inner: Arc<Inner>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Resolver {
    pub fn new(cfg: Config) -> Result<Self> {
        let mut cfg = cfg;
        if cfg.workers == 0 {
            cfg.workers = 2;
        }
        if cfg.roots.is_empty() {
            cfg.roots.push(PathBuf::from("."));
        }
        for root in &cfg.roots {
            if root.as_os_str().is_empty() {
                anyhow::bail!("assets: empty search root");
            }
        }

        let (job_tx, job_rx) = unbounded();
        let (stop_tx, stop_rx) = unbounded();

        let inner = Arc::new(Inner {
            cfg,
            resolved: Mutex::new(HashMap::new()),
            jobs: job_tx,
            stop: stop_tx,
        });

        let mut handles = Vec::new();
        for _ in 0..inner.cfg.workers {
            let rx_jobs = job_rx.clone();
            let rx_stop = stop_rx.clone();
            let worker_inner = inner.clone();
            handles.push(
                thread::Builder::new()
                    .name("asset-probe".into())
                    .spawn(move || worker_inner.worker(rx_jobs, rx_stop))
                    .context("assets: spawn probe worker")?,
            );
        }

        Ok(Self { inner, handles })
    }

    pub fn handle(&self) -> Handle {
        Handle {
            inner: self.inner.clone(),
        }
    }

    fn shutdown(&mut self) {
        for _ in &self.handles {
            let _ = self.inner.stop.send(());
        }
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Clone)]
pub struct Handle {
    inner: Arc<Inner>,
}

impl Handle {
    /// Answers from the session cache when the asset has already been
    /// resolved, otherwise schedules a probe.
    pub fn probe(&self, asset: AssetRef) -> Receiver<Resolution> {
        self.schedule(
            asset.key,
            asset.candidates.iter().map(|c| (*c).to_string()).collect(),
        )
    }

    /// Probe a single fixed path, e.g. an avatar reference.
    pub fn probe_path(&self, path: &'static str) -> Receiver<Resolution> {
        self.schedule(path, vec![path.to_string()])
    }

    fn schedule(&self, key: &'static str, candidates: Vec<String>) -> Receiver<Resolution> {
        let (tx, rx) = unbounded();
        if let Some(cached) = self.inner.resolved.lock().get(key) {
            let _ = tx.send(Resolution {
                key,
                path: cached.clone(),
            });
            return rx;
        }
        let _ = self.inner.jobs.send(Job {
            key,
            candidates,
            tx,
        });
        rx
    }

    /// Cached resolution, if this asset has been probed this session.
    pub fn cached(&self, key: &'static str) -> Option<Option<PathBuf>> {
        self.inner.resolved.lock().get(key).cloned()
    }
}

impl Inner {
    fn worker(&self, jobs: Receiver<Job>, stop: Receiver<()>) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(jobs) -> msg => {
                    match msg {
                        Ok(job) => self.process(job),
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn process(&self, job: Job) {
        let located = self.locate(&job.candidates);
        let canonical = {
            let mut resolved = self.resolved.lock();
            resolved.entry(job.key).or_insert_with(|| located).clone()
        };
        let _ = job.tx.send(Resolution {
            key: job.key,
            path: canonical,
        });
    }

    fn locate(&self, candidates: &[String]) -> Option<PathBuf> {
        for candidate in candidates {
            for root in &self.cfg.roots {
                let path = root.join(candidate);
                if looks_like_image(&path) {
                    return Some(path);
                }
            }
        }
        None
    }
}

fn looks_like_image(path: &Path) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return false;
    };
    image::guess_format(&bytes).is_ok()
}
