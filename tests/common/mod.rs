//! Shared test doubles: a scriptable converter and an in-memory document store.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use pageplane::confluence::{
    Attachment, DocumentStore, NewPage, PageUpdate, RemotePage, Space, StoreError,
};
use pageplane::converter::{ConversionError, ConversionRequest, Converter, Engine};
use regex::Regex;

lazy_static! {
    static ref MARKDOWN_IMAGE: Regex = Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").unwrap();
}

/// Diagram sources containing this marker fail to render
pub const FAIL_MARKER: &str = "%% fail";

/// Diagram sources containing this marker render slower than any test timeout
pub const SLOW_MARKER: &str = "%% slow";

/// Converter that renders diagrams to `PNG:<source>` and Markdown to minimal HTML.
#[derive(Default)]
pub struct FakeConverter {
    calls: AtomicUsize,
    diagram_calls: AtomicUsize,
}

impl FakeConverter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn diagram_calls(&self) -> usize {
        self.diagram_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for FakeConverter {
    async fn convert(&self, request: ConversionRequest) -> Result<Vec<u8>, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let source = String::from_utf8_lossy(&request.source).into_owned();

        match request.engine {
            Engine::Diagram => {
                self.diagram_calls.fetch_add(1, Ordering::SeqCst);
                if source.contains(SLOW_MARKER) {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                if source.contains(FAIL_MARKER) {
                    return Err(ConversionError::Failed {
                        engine: Engine::Diagram,
                        message: "Parse error on line 2".to_string(),
                    });
                }
                Ok(format!("PNG:{}", source).into_bytes())
            }
            Engine::Document => Ok(MARKDOWN_IMAGE
                .replace_all(&source, r#"<img src="$2" alt="$1" />"#)
                .into_owned()
                .into_bytes()),
            Engine::Image => Ok(request.source),
        }
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Debug, Clone)]
pub struct StoredPage {
    pub page: RemotePage,
    pub parent_id: Option<String>,
    pub body: String,
    pub attachments: Vec<String>,
}

#[derive(Default)]
struct StoreState {
    pages: HashMap<String, StoredPage>,
    next_id: u64,
    failing_uploads: HashSet<String>,
    fail_updates: bool,
    create_delay: Option<Duration>,
}

/// Document store with the same optimistic-concurrency rule as Confluence
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, page_id: &str) -> Option<StoredPage> {
        self.state.lock().unwrap().pages.get(page_id).cloned()
    }

    pub fn page_count(&self) -> usize {
        self.state.lock().unwrap().pages.len()
    }

    /// Simulate someone editing the page in the wiki
    pub fn edit_remotely(&self, page_id: &str) {
        let mut state = self.state.lock().unwrap();
        let stored = state.pages.get_mut(page_id).unwrap();
        stored.page.version += 1;
        stored.body.push_str("<p>edited in the wiki</p>");
    }

    /// Simulate someone deleting the page in the wiki
    pub fn delete_remotely(&self, page_id: &str) {
        self.state.lock().unwrap().pages.remove(page_id);
    }

    pub fn fail_upload(&self, filename: &str) {
        self.state.lock().unwrap().failing_uploads.insert(filename.to_string());
    }

    pub fn fail_updates(&self) {
        self.state.lock().unwrap().fail_updates = true;
    }

    /// Make every page creation take at least `delay`
    pub fn slow_creates(&self, delay: Duration) {
        self.state.lock().unwrap().create_delay = Some(delay);
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_page(&self, page_id: &str) -> Result<RemotePage, StoreError> {
        self.page(page_id)
            .map(|stored| stored.page)
            .ok_or_else(|| StoreError::NotFound(page_id.to_string()))
    }

    async fn create_page(&self, page: NewPage) -> Result<RemotePage, StoreError> {
        let delay = self.state.lock().unwrap().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("{}", 1000 + state.next_id);
        let remote = RemotePage {
            id: id.clone(),
            title: page.title,
            space_key: page.space_key.clone(),
            version: 1,
            web_url: Some(format!("https://wiki.test/spaces/{}/pages/{}", page.space_key, id)),
        };
        state.pages.insert(
            id,
            StoredPage {
                page: remote.clone(),
                parent_id: page.parent_id,
                body: page.body,
                attachments: Vec::new(),
            },
        );
        Ok(remote)
    }

    async fn update_page(&self, update: PageUpdate) -> Result<RemotePage, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_updates {
            return Err(StoreError::Status { status: 500, message: "boom".to_string() });
        }
        let stored = state
            .pages
            .get_mut(&update.page_id)
            .ok_or_else(|| StoreError::NotFound(update.page_id.clone()))?;

        if stored.page.version != update.expected_version {
            return Err(StoreError::Conflict {
                page_id: update.page_id,
                message: format!(
                    "version {} is current, update was based on {}",
                    stored.page.version, update.expected_version
                ),
            });
        }

        stored.page.version += 1;
        stored.page.title = update.title;
        stored.body = update.body;
        Ok(stored.page.clone())
    }

    async fn delete_page(&self, page_id: &str) -> Result<(), StoreError> {
        self.state
            .lock()
            .unwrap()
            .pages
            .remove(page_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(page_id.to_string()))
    }

    async fn upload_attachment(
        &self,
        page_id: &str,
        attachment: Attachment,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_uploads.contains(&attachment.filename) {
            return Err(StoreError::Status { status: 413, message: "too large".to_string() });
        }
        let stored = state
            .pages
            .get_mut(page_id)
            .ok_or_else(|| StoreError::NotFound(page_id.to_string()))?;
        if !stored.attachments.contains(&attachment.filename) {
            stored.attachments.push(attachment.filename);
        }
        Ok(())
    }

    async fn list_spaces(&self, limit: usize) -> Result<Vec<Space>, StoreError> {
        let spaces = vec![
            Space { key: "DOCS".to_string(), name: "Documentation".to_string() },
            Space { key: "ENG".to_string(), name: "Engineering".to_string() },
        ];
        Ok(spaces.into_iter().take(limit).collect())
    }
}

/// A Markdown document with three diagrams; the second one fails to render
pub fn three_diagram_document() -> String {
    format!(
        "# Architecture\n\n\
         ```mermaid\ngraph TD\n  A-->B\n```\n\n\
         Between the diagrams.\n\n\
         ```mermaid\ngraph TD\n  {}\n  C-->\n```\n\n\
         ```mermaid\nsequenceDiagram\n  A->>B: hi\n```\n",
        FAIL_MARKER
    )
}
