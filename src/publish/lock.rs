//! Per-target deployment serialization.
//!
//! Every deployment to a target draws a ticket from `<target>.ticket`
//! (incremented under its own `flock`), then competes for the exclusive
//! lock on `<target>.lock`. At most one permit per target exists at a time,
//! across processes.
//!
//! Under [`ConcurrencyPolicy::Queue`] a waiter simply waits for the lock.
//! Under [`ConcurrencyPolicy::Preempt`] a newer ticket wins: waiters holding
//! an older ticket give up, and the permit holder learns at its next
//! [`DeploymentPermit::checkpoint`] that it has been superseded.

use crate::config::ConcurrencyPolicy;
use crate::error::{PublishError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Hands out deployment permits for named targets
#[derive(Debug, Clone)]
pub struct DeploymentGate {
    lock_dir: PathBuf,
    policy: ConcurrencyPolicy,
    poll_interval: Duration,
}

/// Exclusive right to deploy to one target; released on drop
#[derive(Debug)]
pub struct DeploymentPermit {
    target: String,
    ticket: u64,
    ticket_path: PathBuf,
    policy: ConcurrencyPolicy,
    _guard: LockGuard,
}

impl DeploymentGate {
    /// Gate keeping its lock files in `lock_dir`
    pub fn new(lock_dir: impl Into<PathBuf>, policy: ConcurrencyPolicy) -> Self {
        Self {
            lock_dir: lock_dir.into(),
            policy,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How often a waiter re-checks the lock
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Policy applied to overlapping deployments
    pub fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    /// Wait for the right to deploy to `target`.
    ///
    /// Fails with [`PublishError::Superseded`] when, under the preempt
    /// policy, a newer request arrives before this one got the lock.
    pub async fn enter(&self, target: &str) -> Result<DeploymentPermit> {
        fs::create_dir_all(&self.lock_dir).map_err(|e| lock_error(target, e))?;
        let ticket = self.issue_ticket(target).await?;
        let lock_path = self.lock_dir.join(format!("{}.lock", file_stem(target)));
        let mut announced = false;

        loop {
            if self.policy == ConcurrencyPolicy::Preempt {
                let latest = self.latest_ticket(target)?;
                if latest > ticket {
                    log::info!("Deployment ticket {ticket} for '{target}' superseded by {latest}");
                    return Err(superseded(target, ticket, latest));
                }
            }

            if let Some(guard) = try_lock(&lock_path).map_err(|e| lock_error(target, e))? {
                guard
                    .record_holder(ticket)
                    .map_err(|e| lock_error(target, e))?;
                log::debug!("Acquired deployment lock for '{target}' with ticket {ticket}");
                return Ok(DeploymentPermit {
                    target: target.to_string(),
                    ticket,
                    ticket_path: self.ticket_path(target),
                    policy: self.policy,
                    _guard: guard,
                });
            }

            if !announced {
                log::info!("Deployment to '{target}' in progress elsewhere; waiting (ticket {ticket})");
                announced = true;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Newest ticket issued for `target`; 0 when none was
    pub fn latest_ticket(&self, target: &str) -> Result<u64> {
        read_ticket(&self.ticket_path(target)).map_err(|e| lock_error(target, e))
    }

    fn ticket_path(&self, target: &str) -> PathBuf {
        self.lock_dir.join(format!("{}.ticket", file_stem(target)))
    }

    async fn issue_ticket(&self, target: &str) -> Result<u64> {
        let path = self.ticket_path(target);
        let guard_path = path.with_extension("ticket.lock");
        let _guard = loop {
            match try_lock(&guard_path).map_err(|e| lock_error(target, e))? {
                Some(guard) => break guard,
                None => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        };

        let ticket = read_ticket(&path).map_err(|e| lock_error(target, e))? + 1;
        let staging = path.with_extension("ticket.tmp");
        fs::write(&staging, ticket.to_string()).map_err(|e| lock_error(target, e))?;
        fs::rename(&staging, &path).map_err(|e| lock_error(target, e))?;
        Ok(ticket)
    }
}

impl DeploymentPermit {
    /// Target this permit covers
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Ticket drawn on arrival
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Fail if a newer deployment has asked to take over.
    ///
    /// Deployers call this between steps; under the queue policy it never
    /// fails.
    pub fn checkpoint(&self) -> Result<()> {
        if self.policy != ConcurrencyPolicy::Preempt {
            return Ok(());
        }
        let latest = read_ticket(&self.ticket_path).map_err(|e| lock_error(&self.target, e))?;
        if latest > self.ticket {
            log::warn!(
                "Deployment to '{}' preempted (ticket {} < {})",
                self.target,
                self.ticket,
                latest
            );
            return Err(superseded(&self.target, self.ticket, latest));
        }
        Ok(())
    }
}

fn read_ticket(path: &Path) -> io::Result<u64> {
    match fs::read_to_string(path) {
        Ok(content) => content.trim().parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} does not hold a ticket number", path.display()),
            )
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// Target names become file names
fn file_stem(target: &str) -> String {
    target
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn lock_error(target: &str, error: io::Error) -> crate::error::PipelineError {
    PublishError::Lock {
        target: target.to_string(),
        reason: error.to_string(),
    }
    .into()
}

fn superseded(target: &str, ticket: u64, latest: u64) -> crate::error::PipelineError {
    PublishError::Superseded {
        target: target.to_string(),
        ticket,
        latest,
    }
    .into()
}

/// Held advisory lock; the kernel releases it when the file is closed
#[cfg(unix)]
struct LockGuard {
    lock: nix::fcntl::Flock<File>,
}

#[cfg(unix)]
fn try_lock(path: &Path) -> io::Result<Option<LockGuard>> {
    use nix::errno::Errno;
    use nix::fcntl::{Flock, FlockArg};

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => Ok(Some(LockGuard { lock })),
        Err((_, Errno::EWOULDBLOCK)) => Ok(None),
        Err((_, errno)) => Err(io::Error::from(errno)),
    }
}

#[cfg(unix)]
impl LockGuard {
    fn file(&self) -> &File {
        &self.lock
    }
}

/// Lock file that exists only while held
#[cfg(not(unix))]
struct LockGuard {
    path: PathBuf,
    file: File,
}

#[cfg(not(unix))]
fn try_lock(path: &Path) -> io::Result<Option<LockGuard>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(Some(LockGuard {
            path: path.to_path_buf(),
            file,
        })),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
impl LockGuard {
    fn file(&self) -> &File {
        &self.file
    }
}

#[cfg(not(unix))]
impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LockGuard")
    }
}

impl LockGuard {
    /// Leave a note for whoever finds the lock taken
    fn record_holder(&self, ticket: u64) -> io::Result<()> {
        let holder = serde_json::json!({
            "pid": std::process::id(),
            "ticket": ticket,
            "acquired_at": chrono::Utc::now().to_rfc3339(),
        });
        let mut file = self.file();
        file.set_len(0)?;
        file.write_all(holder.to_string().as_bytes())?;
        Ok(())
    }
}
