use std::future::Future;

use tokio::sync::oneshot;

pub struct Fut<T> {
    recv: oneshot::Receiver<T>,
}

impl<T> Fut<T>
where
    T: Send + 'static,
{
    pub const fn new(recv: oneshot::Receiver<T>) -> Self {
        Self { recv }
    }

    pub fn ready(value: T) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(value);
        Self { recv: rx }
    }

    pub fn spawn(fut: impl Future<Output = T> + Send + 'static) -> Self {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = fut.await;
            let _ = tx.send(result);
        });
        Self { recv: rx }
    }

    pub fn try_resolve(&mut self) -> Option<T> {
        self.recv.try_recv().ok()
    }

    pub async fn wait(self) -> Option<T> {
        self.recv.await.ok()
    }
}
