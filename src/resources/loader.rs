//! Background decoding and the render-thread upload queue.
//!
//! Decoding runs on a worker pool sized to the machine. GPU-mutating
//! follow-ups are never run on a worker: they are pushed onto the
//! [`UploadQueue`] and executed by the render thread when it drains the
//! queue at the start of the next frame.

use std::{sync::Arc, thread};

use futures::channel::oneshot;
use tokio::{
    runtime::Runtime,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel},
    task::JoinHandle,
};

use crate::{
    data_structures::{
        SkyboxId, TextureId,
        texture::{Skybox, TextureResource},
    },
    gpu::GpuDevice,
    resources::registry::GpuRegistry,
};

/// GPU work handed from a worker to the render thread.
pub type UploadTask = Box<dyn FnOnce(&mut GpuRegistry, &mut dyn GpuDevice) + Send>;

/// Cloneable producer side of the [`UploadQueue`].
#[derive(Clone)]
pub struct UploadSender(UnboundedSender<UploadTask>);

impl UploadSender {
    pub fn push(&self, task: UploadTask) {
        if self.0.send(task).is_err() {
            log::warn!("Upload queue is closed, dropping GPU upload.");
        }
    }
}

/// Single-consumer queue of GPU uploads owned by the render thread.
pub struct UploadQueue {
    sender: UnboundedSender<UploadTask>,
    receiver: UnboundedReceiver<UploadTask>,
}

impl UploadQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded_channel();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> UploadSender {
        UploadSender(self.sender.clone())
    }

    /// Run every queued upload in submission order. Returns how many ran.
    pub fn drain(&mut self, registry: &mut GpuRegistry, device: &mut dyn GpuDevice) -> usize {
        let mut count = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(task) => {
                    task(registry, device);
                    count += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        count
    }
}

impl Default for UploadQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker pool decoding resources off the render thread.
pub struct ResourceLoader {
    runtime: Runtime,
    uploads: UploadSender,
    pending: Vec<JoinHandle<()>>,
}

impl ResourceLoader {
    pub fn new(uploads: UploadSender) -> anyhow::Result<Self> {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .max_blocking_threads(workers)
            .thread_name("forge-render-loader")
            .enable_all()
            .build()?;
        log::info!("Resource loader started with {workers} workers");
        Ok(Self {
            runtime,
            uploads,
            pending: Vec::new(),
        })
    }

    pub fn pending(&self) -> usize {
        self.pending.iter().filter(|handle| !handle.is_finished()).count()
    }

    /// Join handles currently held, finished or not.
    pub fn tracked(&self) -> usize {
        self.pending.len()
    }

    /// Run `decode` on the worker pool. On success `upload` is queued for the
    /// render thread and the decoded value is sent back to the caller.
    pub fn spawn<T, D, U>(&mut self, label: String, decode: D, upload: U) -> oneshot::Receiver<anyhow::Result<Arc<T>>>
    where
        T: Send + Sync + 'static,
        D: FnOnce() -> anyhow::Result<T> + Send + 'static,
        U: FnOnce(&T, &mut GpuRegistry, &mut dyn GpuDevice) + Send + 'static,
    {
        self.pending.retain(|handle| !handle.is_finished());
        let (tx, rx) = oneshot::channel();
        let uploads = self.uploads.clone();
        let handle = self.runtime.spawn(async move {
            let result = match tokio::task::spawn_blocking(decode).await {
                Ok(result) => result.map(Arc::new),
                Err(e) => Err(anyhow::anyhow!("decode task for {label} failed: {e}")),
            };
            match &result {
                Ok(value) => {
                    let value = value.clone();
                    uploads.push(Box::new(
                        move |registry: &mut GpuRegistry, device: &mut dyn GpuDevice| {
                            upload(&value, registry, device)
                        },
                    ));
                }
                Err(e) => log::warn!("Could not load {label}: {e:#}"),
            }
            // The caller may have stopped waiting.
            let _ = tx.send(result);
        });
        self.pending.push(handle);
        rx
    }

    /// Decode an encoded image into a texture and queue its slot upload.
    pub fn load_texture(
        &mut self,
        id: TextureId,
        name: String,
        bytes: Vec<u8>,
        format: Option<String>,
        slot_size: u32,
    ) -> oneshot::Receiver<anyhow::Result<Arc<TextureResource>>> {
        let label = name.clone();
        self.spawn(
            label,
            move || TextureResource::from_bytes(id, &name, &bytes, format.as_deref(), slot_size),
            |texture, registry, device| {
                registry.create_texture(device, texture);
            },
        )
    }

    /// Decode six face images into a skybox and queue its cubemap upload.
    pub fn load_skybox(
        &mut self,
        id: SkyboxId,
        faces: [Vec<u8>; 6],
        size: u32,
    ) -> oneshot::Receiver<anyhow::Result<Arc<Skybox>>> {
        self.spawn(
            format!("skybox {}", id.raw()),
            move || Skybox::from_encoded_faces(id, &faces, size),
            |skybox, registry, device| {
                registry.create_skybox(device, skybox);
            },
        )
    }

    /// Block until every job spawned so far has finished. Meant for start-up
    /// and bulk imports, not for the frame loop.
    pub fn wait_idle(&mut self) {
        let handles: Vec<JoinHandle<()>> = self.pending.drain(..).collect();
        let results = self.runtime.block_on(futures::future::join_all(handles));
        for result in results {
            if let Err(e) = result {
                log::error!("Loader task panicked: {e}");
            }
        }
    }
}
