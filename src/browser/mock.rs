//! Scriptable in-memory browser stack for tests.
//!
//! Each opened page consumes the next scripted [`PageOutcome`]; when the
//! script runs dry, pages behave like a healthy 200 capture. Page
//! open/close counters let tests assert the close-on-every-exit-path rule.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BrowserGateway, BrowserPage, BrowserSession, ImageFormat, NavigationResponse};

/// Behavior of one mocked page, consumed in script order.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    /// Navigation returns 200 and every artifact renders.
    Success,
    /// Navigation returns the given status code (and optional status text).
    HttpStatus(u16, Option<String>),
    /// Navigation fails with this error message.
    NavigationError(String),
    /// Navigation never completes; only an outer timeout ends it.
    NavigationHang,
    /// Navigation succeeds but rendering fails with this message.
    RenderError(String),
    /// Navigation succeeds but rendering never completes.
    RenderHang,
}

pub struct MockGateway {
    refuse_endpoints: HashSet<String>,
    outcomes: Arc<Mutex<VecDeque<PageOutcome>>>,
    pub pages_opened: Arc<AtomicUsize>,
    pub pages_closed: Arc<AtomicUsize>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            refuse_endpoints: HashSet::new(),
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            pages_opened: Arc::new(AtomicUsize::new(0)),
            pages_closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Refuse connections to the given endpoints.
    pub fn refusing(endpoints: &[&str]) -> Self {
        let mut gateway = Self::new();
        gateway.refuse_endpoints = endpoints.iter().map(|s| s.to_string()).collect();
        gateway
    }

    /// Append a scripted outcome for the next opened page.
    pub fn push_outcome(&self, outcome: PageOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }
}

#[async_trait]
impl BrowserGateway for MockGateway {
    async fn connect(&self, endpoint: &str, _slow_mo_ms: u64) -> Result<Box<dyn BrowserSession>> {
        if self.refuse_endpoints.contains(endpoint) {
            bail!("connection refused: {}", endpoint);
        }
        Ok(Box::new(MockSession {
            outcomes: self.outcomes.clone(),
            pages_opened: self.pages_opened.clone(),
            pages_closed: self.pages_closed.clone(),
        }))
    }
}

pub struct MockSession {
    outcomes: Arc<Mutex<VecDeque<PageOutcome>>>,
    pages_opened: Arc<AtomicUsize>,
    pages_closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>> {
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PageOutcome::Success);
        self.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPage {
            outcome,
            pages_closed: self.pages_closed.clone(),
        }))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct MockPage {
    outcome: PageOutcome,
    pages_closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn set_viewport(&self, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    async fn set_user_agent(&self, _user_agent: &str) -> Result<()> {
        Ok(())
    }

    async fn navigate(&self, _url: &str) -> Result<NavigationResponse> {
        match &self.outcome {
            PageOutcome::Success
            | PageOutcome::RenderError(_)
            | PageOutcome::RenderHang => Ok(NavigationResponse { status: 200, status_text: None }),
            PageOutcome::HttpStatus(status, text) => Ok(NavigationResponse {
                status: *status,
                status_text: text.clone(),
            }),
            PageOutcome::NavigationError(message) => Err(anyhow!("{}", message)),
            PageOutcome::NavigationHang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("navigation hang outlived its test")
            }
        }
    }

    async fn evaluate(&self, _expression: &str) -> Result<()> {
        Ok(())
    }

    async fn screenshot(
        &self,
        format: ImageFormat,
        _quality: Option<u32>,
        _full_page: bool,
    ) -> Result<Vec<u8>> {
        match &self.outcome {
            PageOutcome::RenderError(message) => Err(anyhow!("{}", message)),
            PageOutcome::RenderHang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("render hang outlived its test")
            }
            _ => Ok(match format {
                // Real magic bytes so artifact assertions can sniff them
                ImageFormat::Png => vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
                ImageFormat::Jpeg => vec![0xFF, 0xD8, 0xFF, 0xE0],
            }),
        }
    }

    async fn content(&self) -> Result<String> {
        match &self.outcome {
            PageOutcome::RenderError(message) => Err(anyhow!("{}", message)),
            _ => Ok("<html><head></head><body>mock page</body></html>".to_string()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
