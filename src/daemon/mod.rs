pub mod fifo;
pub mod retry;

use std::fmt::Display;
use std::thread;

use crate::api::client::{ApiResponse, DeliveryClient};
use crate::daemon::fifo::NamedPipe;
use crate::daemon::retry::RetryPolicy;
use crate::domain::email::NormalizedEmail;
use crate::error::{DeliveryError, IntakeError, StoreError};
use crate::mail::normalizer::Normalizer;
use crate::store::dead_letter::DeadLetterBox;
use crate::store::repo::RecordStore;

/// Where the intake loop is within one pipe cycle.
#[derive(Debug)]
pub enum IntakeState {
    EnsurePipe,
    AwaitMessage,
    ProcessMessage(Vec<u8>),
    ErrorBackoff(IntakeError),
}

/// How a cycle ended. Every outcome leads back to `EnsurePipe`.
#[derive(Debug)]
pub enum CycleOutcome {
    Delivered {
        email: NormalizedEmail,
        response: ApiResponse,
    },
    /// The writer sent nothing but whitespace.
    Skipped,
    Failed(IntakeError),
}

pub struct IntakeLoop<'a> {
    pipe: NamedPipe,
    normalizer: Normalizer,
    store: &'a dyn RecordStore,
    delivery: DeliveryClient,
    dead_letters: Option<DeadLetterBox>,
    retry: RetryPolicy,
    consecutive_failures: u32,
}

impl<'a> IntakeLoop<'a> {
    pub fn new(
        pipe: NamedPipe,
        normalizer: Normalizer,
        store: &'a dyn RecordStore,
        delivery: DeliveryClient,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            pipe,
            normalizer,
            store,
            delivery,
            dead_letters: None,
            retry,
            consecutive_failures: 0,
        }
    }

    pub fn with_dead_letters(mut self, dead_letters: DeadLetterBox) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }

    /// Process messages until the process is killed.
    pub fn run(&mut self) -> ! {
        log::info!("watching FIFO at {}", self.pipe.path().display());
        loop {
            self.run_once();
        }
    }

    /// Drive the state machine from `EnsurePipe` through exactly one pipe read.
    pub fn run_once(&mut self) -> CycleOutcome {
        let mut state = IntakeState::EnsurePipe;
        loop {
            state = match state {
                IntakeState::EnsurePipe => match self.pipe.ensure() {
                    Ok(()) => IntakeState::AwaitMessage,
                    Err(e) => IntakeState::ErrorBackoff(self.pipe_error(e)),
                },

                IntakeState::AwaitMessage => match self.pipe.read_message() {
                    Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => {
                        log::debug!("FIFO read was empty or whitespace only");
                        return CycleOutcome::Skipped;
                    }
                    Ok(raw) => IntakeState::ProcessMessage(raw),
                    Err(e) => IntakeState::ErrorBackoff(self.pipe_error(e)),
                },

                IntakeState::ProcessMessage(raw) => match self.process(&raw) {
                    Ok((email, response)) => {
                        self.consecutive_failures = 0;
                        return CycleOutcome::Delivered { email, response };
                    }
                    Err(e) => IntakeState::ErrorBackoff(e),
                },

                IntakeState::ErrorBackoff(e) => {
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    let delay = self.retry.delay(self.consecutive_failures);
                    log::error!("intake cycle failed: {e}; backing off for {delay:?}");
                    thread::sleep(delay);
                    return CycleOutcome::Failed(e);
                }
            };
        }
    }

    /// Normalize, persist, deliver. Persistence always happens before delivery and is kept
    /// even when delivery fails.
    fn process(&mut self, raw: &[u8]) -> Result<(NormalizedEmail, ApiResponse), IntakeError> {
        let email = match self.normalizer.normalize(raw) {
            Ok(email) => email,
            Err(e) => {
                self.dead_letter(raw, &e);
                return Err(e.into());
            }
        };

        let store = self.store;
        let stored = self
            .retry
            .run("store", || store.append(&email), StoreError::is_retryable);
        if let Err(e) = stored {
            self.dead_letter(raw, &e);
            return Err(e.into());
        }

        let delivery = &mut self.delivery;
        let delivered = self.retry.run(
            "delivery",
            || delivery.deliver(&email),
            DeliveryError::is_retryable,
        );
        match delivered {
            Ok(response) => Ok((email, response)),
            Err(e) => {
                self.dead_letter(raw, &e);
                Err(e.into())
            }
        }
    }

    fn dead_letter(&self, raw: &[u8], reason: &dyn Display) {
        let Some(dead_letters) = &self.dead_letters else {
            return;
        };
        if let Err(e) = dead_letters.put(raw, &reason.to_string()) {
            log::error!("could not dead-letter message: {e}");
        }
    }

    fn pipe_error(&self, source: std::io::Error) -> IntakeError {
        IntakeError::Pipe {
            path: self.pipe.path().to_path_buf(),
            source,
        }
    }
}
