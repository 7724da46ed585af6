//! Generated-document state.
//!
//! The state is a plain value owned by [`Session`]; interested parties
//! subscribe to a channel and are told when it changes.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use std::io::IsTerminal;
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::{debug, info};

use crate::store::{Store, PDF_KEY, REVIEW_ASKED_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfState {
    /// Storage has not been read yet
    NotReady,
    NotGenerated,
    /// Base64 of the generated document
    Generated { data: String },
}

impl PdfState {
    pub fn is_generated(&self) -> bool {
        matches!(self, PdfState::Generated { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Storage was read; carries whether a document was found
    Loaded { generated: bool },
    Generated,
    Reset,
}

pub struct Session {
    state: PdfState,
    store: Store,
    subscribers: Vec<Sender<SessionEvent>>,
}

impl Session {
    pub fn new(store: Store) -> Self {
        Self {
            state: PdfState::NotReady,
            store,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> &PdfState {
        &self.state
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, event: SessionEvent) {
        // Dropped receivers unsubscribe
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    /// Read a previously generated document from storage
    pub fn load(&mut self) {
        self.state = match self.store.get(PDF_KEY) {
            Some(data) => PdfState::Generated { data: data.to_string() },
            None => PdfState::NotGenerated,
        };
        let generated = self.state.is_generated();
        debug!(generated, "Session loaded");
        self.notify(SessionEvent::Loaded { generated });
    }

    /// Forget the stored document
    pub fn reset(&mut self) -> Result<()> {
        self.store.remove(PDF_KEY)?;
        self.state = PdfState::NotGenerated;
        self.notify(SessionEvent::Reset);
        Ok(())
    }

    /// Persist a freshly generated document and publish it
    pub fn complete_generation(&mut self, pdf: &[u8]) -> Result<()> {
        let data = B64.encode(pdf);
        self.store.set(PDF_KEY, &data)?;
        self.state = PdfState::Generated { data };
        self.notify(SessionEvent::Generated);
        Ok(())
    }

    /// Decoded bytes of the generated document, if there is one
    pub fn pdf_bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.state {
            PdfState::Generated { data } => {
                let bytes = B64.decode(data)
                    .with_context(|| "Stored attestation is not valid base64")?;
                Ok(Some(bytes))
            }
            _ => Ok(None),
        }
    }
}

/// Host capability for asking the user to rate the tool
pub trait ReviewPrompter {
    fn is_available(&self) -> bool;
    fn request_review(&self);
}

/// Prompt on stdout, only when attached to a terminal
pub struct TerminalReviewPrompt;

impl ReviewPrompter for TerminalReviewPrompt {
    fn is_available(&self) -> bool {
        std::io::stdout().is_terminal()
    }

    fn request_review(&self) {
        println!("Finding this tool useful? A review or a star helps other people find it.");
    }
}

/// Ask for a review once, the first time a document is available.
/// Returns whether the prompt was shown.
pub fn maybe_request_review(store: &mut Store, prompter: &dyn ReviewPrompter) -> Result<bool> {
    if store.get(REVIEW_ASKED_KEY).is_some() || !prompter.is_available() {
        return Ok(false);
    }
    prompter.request_review();
    store.set(REVIEW_ASKED_KEY, "true")?;
    info!("Review prompt shown");
    Ok(true)
}
