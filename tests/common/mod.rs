#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use itemhub::SearchIndexClient;
use itemhub::model::types::IndexableDocument;

static TRACING: Once = Once::new();

/// Honor `RUST_LOG` in test output; safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// In-memory index client that records every invocation, for asserting the
/// store-then-index contract.
#[derive(Clone, Default)]
pub struct RecordingClient {
    upserts: Arc<Mutex<Vec<(String, IndexableDocument)>>>,
    deletes: Arc<Mutex<Vec<(String, String)>>>,
    indexed: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingClient {
    pub fn upserts(&self) -> Vec<(String, IndexableDocument)> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.upserts.lock().unwrap().len() + self.deletes.lock().unwrap().len()
    }

    /// Make every subsequent call fail, simulating an unavailable index.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl SearchIndexClient for RecordingClient {
    fn upsert(&self, index: &str, doc: &IndexableDocument) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("index unavailable");
        }
        self.upserts
            .lock()
            .unwrap()
            .push((index.to_string(), doc.clone()));
        let mut indexed = self.indexed.lock().unwrap();
        if !indexed.contains(&doc.id) {
            indexed.push(doc.id.clone());
        }
        Ok(())
    }

    fn delete(&self, index: &str, doc_id: &str) -> anyhow::Result<bool> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("index unavailable");
        }
        self.deletes
            .lock()
            .unwrap()
            .push((index.to_string(), doc_id.to_string()));
        let mut indexed = self.indexed.lock().unwrap();
        let before = indexed.len();
        indexed.retain(|id| id != doc_id);
        Ok(indexed.len() != before)
    }
}
