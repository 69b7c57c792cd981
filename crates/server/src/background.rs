use std::{future::Future, sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinSet};

/// Work spawned after a response has already been sent, such as Slack
/// events processed once the 200 acknowledgement is out.
///
/// Shutdown drains it so accepted events are not dropped mid-reply.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        // Reap finished tasks so the set only holds live work.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    pub async fn in_flight(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Waits up to `grace` for every tracked task, then aborts the rest.
    /// Returns how many were still running when the grace window closed.
    pub async fn drain(&self, grace: Duration) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        let finished = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        match finished {
            Ok(()) => 0,
            Err(_) => {
                let unfinished = tasks.len();
                tasks.shutdown().await;
                unfinished
            }
        }
    }
}
