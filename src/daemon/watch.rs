//! The `knox start` event loop.
//!
//! Loads the bunker, starts one session per authorization, then watches
//! the bunker file.  Content changes are debounced and reconciled.  If
//! the file is renamed or removed the daemon gives up, since it can no
//! longer see updates made by other processes.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::reconciler::Reconciler;
use super::session::SessionFactory;
use crate::bunker::{CredentialStore, KnoxState};
use crate::crypto::PassphraseCipher;
use crate::errors::{KnoxError, Result};

/// How one file-system event affects the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileChange {
    Ignored,
    Modified,
    Lost,
}

impl FileChange {
    pub fn classify(kind: &EventKind) -> Self {
        match kind {
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => Self::Lost,
            EventKind::Modify(ModifyKind::Metadata(_)) => Self::Ignored,
            EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any => Self::Modified,
            EventKind::Access(_) | EventKind::Other => Self::Ignored,
        }
    }
}

/// Run the daemon until Ctrl-C or until the bunker file is lost.
///
/// Returns immediately when the bunker holds no authorizations.
pub async fn run_daemon<F>(
    path: PathBuf,
    cipher: PassphraseCipher,
    factory: F,
    debounce: Duration,
) -> Result<()>
where
    F: SessionFactory,
{
    let state = load(&path, &cipher).await?;
    if state.authorizations.is_empty() {
        info!("No authorizations. Create one with `knox uri`.");
        return Ok(());
    }

    let mut reconciler = Reconciler::new(factory, path.clone(), cipher.clone());
    reconciler.start(&state)?;

    let (tx, rx) = unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })?;
    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), sessions = reconciler.tracked().len(), "watching");

    let result = watch_loop(&mut reconciler, rx, &path, &cipher, debounce, ctrl_c()).await;

    reconciler.shutdown();
    drop(watcher);
    result
}

/// Consume file events until `shutdown` resolves or the file is lost.
///
/// The caller owns the reconciler and is responsible for shutting it down.
pub async fn watch_loop<F, S>(
    reconciler: &mut Reconciler<F>,
    mut events: UnboundedReceiver<notify::Result<Event>>,
    path: &Path,
    cipher: &PassphraseCipher,
    debounce: Duration,
    shutdown: S,
) -> Result<()>
where
    F: SessionFactory,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let next = tokio::select! {
            // Drain pending changes before honouring shutdown.
            biased;
            event = events.recv() => event,
            _ = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        };

        let Some(event) = next else {
            return Err(KnoxError::CommandFailed("file watcher stopped".into()));
        };

        let mut change = classify(event);
        if change == FileChange::Ignored {
            continue;
        }

        let mut deadline = Instant::now() + debounce;
        while change != FileChange::Lost {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Some(event)) => {
                    let next = classify(event);
                    if next != FileChange::Ignored {
                        change = change.max(next);
                        deadline = Instant::now() + debounce;
                    }
                }
                _ => break,
            }
        }

        if change == FileChange::Lost {
            error!(path = %path.display(), "bunker file was renamed or removed");
            return Err(KnoxError::StoreFileLost(path.to_path_buf()));
        }

        match load(path, cipher).await {
            Ok(state) => {
                reconciler.reconcile(&state);
            }
            Err(e) => warn!(error = %e, "failed to reload bunker file"),
        }
    }
}

fn classify(event: notify::Result<Event>) -> FileChange {
    match event {
        Ok(event) => {
            let change = FileChange::classify(&event.kind);
            debug!(kind = ?event.kind, ?change, "file event");
            change
        }
        Err(e) => {
            warn!(error = %e, "file watcher error");
            FileChange::Ignored
        }
    }
}

async fn load(path: &Path, cipher: &PassphraseCipher) -> Result<KnoxState> {
    let path = path.to_path_buf();
    let cipher = cipher.clone();
    tokio::task::spawn_blocking(move || CredentialStore::load(&path, &cipher))
        .await
        .map_err(|e| KnoxError::CommandFailed(format!("reload task failed: {e}")))?
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use tokio::sync::oneshot;

    use super::*;
    use crate::config::Settings;
    use crate::daemon::LocalSessionFactory;

    fn cipher() -> PassphraseCipher {
        PassphraseCipher::new("pw").with_work_factor(4)
    }

    fn modified() -> notify::Result<Event> {
        Ok(Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))))
    }

    #[test]
    fn classification() {
        use FileChange::*;
        assert_eq!(FileChange::classify(&EventKind::Remove(RemoveKind::File)), Lost);
        assert_eq!(
            FileChange::classify(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Lost
        );
        assert_eq!(
            FileChange::classify(&EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            Modified
        );
        assert_eq!(FileChange::classify(&EventKind::Create(CreateKind::File)), Modified);
        assert_eq!(
            FileChange::classify(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            Ignored
        );
        assert!(Lost > Modified && Modified > Ignored);
    }

    #[tokio::test]
    async fn empty_bunker_exits_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knox.bunker");
        CredentialStore::create(&path, cipher()).unwrap();

        let result = run_daemon(path, cipher(), LocalSessionFactory::new(), Settings::default().debounce()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_bunker_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bunker");

        let result = run_daemon(path, cipher(), LocalSessionFactory::new(), Settings::default().debounce()).await;
        assert!(matches!(result, Err(KnoxError::StoreNotFound(_))));
    }

    #[tokio::test]
    async fn file_change_is_reconciled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knox.bunker");
        let mut store = CredentialStore::create(&path, cipher()).unwrap();
        store.add_key("alex", crate::crypto::generate_secret_key()).unwrap();
        store
            .generate_uri("alex", &["wss://relay.example.com".into()], None, None)
            .unwrap();
        store.save().unwrap();

        let mut reconciler = Reconciler::new(LocalSessionFactory::new(), path.clone(), cipher());
        reconciler.start(store.state()).unwrap();
        assert_eq!(reconciler.tracked().len(), 1);

        CredentialStore::transaction(&path, &cipher(), |state| {
            state.generate_uri("alex", &["wss://relay.example.com".into()], None, None)
        })
        .unwrap();

        let (tx, rx) = unbounded_channel();
        tx.send(modified()).unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        stop_tx.send(()).unwrap();

        let result = watch_loop(
            &mut reconciler,
            rx,
            &path,
            &cipher(),
            Duration::from_millis(10),
            async {
                let _ = stop_rx.await;
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(reconciler.tracked().len(), 2);
    }

    #[tokio::test]
    async fn removed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knox.bunker");
        CredentialStore::create(&path, cipher()).unwrap();

        let mut reconciler = Reconciler::new(LocalSessionFactory::new(), path.clone(), cipher());
        reconciler.start(&KnoxState::new()).unwrap();

        let (tx, rx) = unbounded_channel();
        tx.send(modified()).unwrap();
        tx.send(Ok(Event::new(EventKind::Remove(RemoveKind::File)))).unwrap();

        let result = watch_loop(
            &mut reconciler,
            rx,
            &path,
            &cipher(),
            Duration::from_millis(10),
            std::future::pending(),
        )
        .await;

        assert!(matches!(result, Err(KnoxError::StoreFileLost(_))));
    }
}
