use std::thread::JoinHandle;

use crate::{
    event::{
        cancellation::CancellationMessage,
        channel::{pub_sub, EventConsumer, EventPublisher},
    },
    utils::threads::spawn_named_thread,
};

/// A background activity that has not been spawned yet.
///
/// The callback receives the consumer side of a cancellation channel and is expected to
/// return soon after a message arrives on it.
pub struct NotStartedThreadContext<F>
where
    F: FnOnce(EventConsumer<CancellationMessage>) + Send + 'static,
{
    thread_name: String,
    callback: F,
}

impl<F> NotStartedThreadContext<F>
where
    F: FnOnce(EventConsumer<CancellationMessage>) + Send + 'static,
{
    pub fn new<S: Into<String>>(thread_name: S, callback: F) -> Self {
        Self {
            thread_name: thread_name.into(),
            callback,
        }
    }

    pub fn start(self) -> StartedThreadContext {
        let (stop_publisher, stop_consumer) = pub_sub::<CancellationMessage>();
        let callback = self.callback;

        StartedThreadContext {
            join_handle: spawn_named_thread(&self.thread_name, move || callback(stop_consumer)),
            thread_name: self.thread_name,
            stop_publisher,
        }
    }
}

pub struct StartedThreadContext {
    thread_name: String,
    stop_publisher: EventPublisher<CancellationMessage>,
    join_handle: JoinHandle<()>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ThreadContextStopperError {
    #[error("error sending stop signal to '{0}' thread: {1}")]
    EventPublisherError(String, String),

    #[error("error joining '{0}' thread: {1}")]
    JoinError(String, String),
}

impl StartedThreadContext {
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Sends the stop signal and waits until the thread is joined.
    ///
    /// A thread that already finished on its own has dropped its consumer, so the send
    /// error is ignored in that case.
    pub fn stop_blocking(self) -> Result<(), ThreadContextStopperError> {
        if let Err(err) = self.stop_publisher.publish(()) {
            if !self.join_handle.is_finished() {
                return Err(ThreadContextStopperError::EventPublisherError(
                    self.thread_name,
                    err.to_string(),
                ));
            }
        }

        self.join_handle.join().map_err(|err| {
            ThreadContextStopperError::JoinError(
                self.thread_name.clone(),
                err.downcast_ref::<&str>()
                    .unwrap_or(&"unknown error")
                    .to_string(),
            )
        })
    }
}
