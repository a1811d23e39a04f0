//! Response pipeline for running generation requests off the event loop
//!
//! Requests arrive over a command channel. Each one runs as a task on a
//! tokio runtime owned by the worker thread and reports back to the
//! controller as `ResponseReady` or `ResponseFailed`.

use crate::controller::{EventSink, RequestId, TurnEvent};
use crate::responder::config::ResponderConfig;
use crate::responder::generator::ResponseGenerator;
use crate::{ParleyError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

/// What the controller needs from response generation
pub trait ResponseDispatcher: Send {
    /// Start generating a reply to `prompt`; the outcome is posted later
    fn request(&self, request: RequestId, prompt: &str) -> Result<()>;

    /// Abandon a request; nothing more is posted for it
    fn cancel(&self, request: RequestId);

    fn shutdown(&self) {}
}

/// Commands that can be sent to the response pipeline
#[derive(Debug, Clone)]
pub enum ResponseCommand {
    Generate { request: RequestId, prompt: String },
    Cancel(RequestId),
    Shutdown,
}

/// Cloneable sending side of the pipeline
#[derive(Clone, Debug)]
pub struct ResponsePipelineHandle {
    command_tx: Sender<ResponseCommand>,
}

impl ResponsePipelineHandle {
    pub fn send_command(&self, cmd: ResponseCommand) -> Result<()> {
        self.command_tx.send(cmd).map_err(|e| {
            ParleyError::ChannelError(format!("Failed to send response command: {}", e))
        })
    }
}

impl ResponseDispatcher for ResponsePipelineHandle {
    fn request(&self, request: RequestId, prompt: &str) -> Result<()> {
        self.send_command(ResponseCommand::Generate {
            request,
            prompt: prompt.to_string(),
        })
    }

    fn cancel(&self, request: RequestId) {
        if let Err(e) = self.send_command(ResponseCommand::Cancel(request)) {
            warn!("Could not cancel {}: {}", request, e);
        }
    }

    fn shutdown(&self) {
        if let Err(e) = self.send_command(ResponseCommand::Shutdown) {
            debug!("Response pipeline already gone: {}", e);
        }
    }
}

pub struct ResponsePipeline {
    config: ResponderConfig,
    generator: Arc<dyn ResponseGenerator>,
    sink: EventSink,
    command_tx: Sender<ResponseCommand>,
    command_rx: Receiver<ResponseCommand>,
}

impl ResponsePipeline {
    pub fn new(
        config: ResponderConfig,
        generator: Arc<dyn ResponseGenerator>,
        sink: EventSink,
    ) -> Self {
        let (command_tx, command_rx) = bounded(config.queue_size.max(1));

        Self {
            config,
            generator,
            sink,
            command_tx,
            command_rx,
        }
    }

    pub fn handle(&self) -> ResponsePipelineHandle {
        ResponsePipelineHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Start the pipeline worker thread
    pub fn start_worker(self) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("parley-responder".to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    fn run(self) {
        info!("Response pipeline worker starting");

        let runtime = match Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to create tokio runtime: {}", e);
                // Fail every request so no turn stays stuck in Processing
                while let Ok(cmd) = self.command_rx.recv() {
                    match cmd {
                        ResponseCommand::Generate { request, .. } => {
                            let failed = TurnEvent::ResponseFailed {
                                request,
                                error: ParleyError::ResponseError(format!(
                                    "Runtime creation failed: {}",
                                    e
                                )),
                            };
                            if let Err(e) = self.sink.post(failed) {
                                warn!("Dropping failure of {}: {}", request, e);
                            }
                        }
                        ResponseCommand::Cancel(_) => {}
                        ResponseCommand::Shutdown => break,
                    }
                }
                return;
            }
        };

        let timeout = self.config.timeout();
        let mut in_flight: HashMap<RequestId, tokio::task::JoinHandle<()>> = HashMap::new();

        loop {
            match self.command_rx.recv() {
                Ok(ResponseCommand::Generate { request, prompt }) => {
                    in_flight.retain(|_, task| !task.is_finished());
                    debug!("Generating response for {}", request);

                    let generator = &self.generator;
                    let future = match panic::catch_unwind(AssertUnwindSafe(|| {
                        generator.generate(prompt)
                    })) {
                        Ok(future) => future,
                        Err(_) => {
                            error!("Generator panicked starting {}", request);
                            self.post_panicked(request);
                            continue;
                        }
                    };

                    let sink = self.sink.clone();
                    let task = runtime.spawn(async move {
                        let guarded = AssertUnwindSafe(future).catch_unwind();
                        let event = match tokio::time::timeout(timeout, guarded).await {
                            Ok(Ok(Ok(text))) => TurnEvent::ResponseReady { request, text },
                            Ok(Ok(Err(error))) => TurnEvent::ResponseFailed { request, error },
                            Ok(Err(_)) => {
                                error!("Generator panicked during {}", request);
                                panicked(request)
                            }
                            Err(_) => TurnEvent::ResponseFailed {
                                request,
                                error: ParleyError::ResponseTimeout(timeout),
                            },
                        };
                        if let Err(e) = sink.post(event) {
                            warn!("Dropping outcome of {}: {}", request, e);
                        }
                    });
                    in_flight.insert(request, task);
                }
                Ok(ResponseCommand::Cancel(request)) => {
                    if let Some(task) = in_flight.remove(&request) {
                        task.abort();
                        debug!("Cancelled {}", request);
                    }
                }
                Ok(ResponseCommand::Shutdown) => {
                    info!("Response pipeline shutdown requested");
                    break;
                }
                Err(_) => {
                    warn!("Response command channel disconnected");
                    break;
                }
            }
        }

        for (_, task) in in_flight.drain() {
            task.abort();
        }
        info!("Response pipeline stopped");
    }

    fn post_panicked(&self, request: RequestId) {
        if let Err(e) = self.sink.post(panicked(request)) {
            warn!("Dropping failure of {}: {}", request, e);
        }
    }
}

fn panicked(request: RequestId) -> TurnEvent {
    TurnEvent::ResponseFailed {
        request,
        error: ParleyError::ResponseError("generator panicked".to_string()),
    }
}
