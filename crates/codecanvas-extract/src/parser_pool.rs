//! Thread-safe parser pool for tree-sitter parsers
//!
//! Tree-sitter parsers are not Sync, so parsing runs on dedicated worker
//! threads fed through a channel. The async wrapper dispatches through
//! `spawn_blocking` so parse waits never stall the runtime.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use tree_sitter::{Parser, Tree};

use crate::extractor::ExtractError;
use crate::language::Lang;

/// A parsing request sent to the pool.
#[derive(Debug)]
pub struct ParseRequest {
    pub lang: Lang,
    pub content: String,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct ParseOutput {
    pub tree: Tree,
    pub content: String,
    pub path: PathBuf,
}

struct WorkerRequest {
    request: ParseRequest,
    reply: mpsc::Sender<Result<ParseOutput, ExtractError>>,
}

/// Channel-fed pool of parser worker threads.
pub struct ParserPool {
    sender: mpsc::Sender<WorkerRequest>,
}

impl ParserPool {
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<WorkerRequest>();
        let receiver = Arc::new(Mutex::new(receiver));
        for id in 0..num_workers.max(1) {
            let receiver = Arc::clone(&receiver);
            std::thread::spawn(move || Self::worker(id, receiver));
        }
        Self { sender }
    }

    /// Pool sized to the host, at least two workers.
    pub fn with_default_size() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get().max(2))
            .unwrap_or(2);
        Self::new(workers)
    }

    fn worker(id: usize, receiver: Arc<Mutex<mpsc::Receiver<WorkerRequest>>>) {
        tracing::debug!(worker = id, "parser worker started");
        let mut parser = Parser::new();
        loop {
            let WorkerRequest { request, reply } = {
                let guard = match receiver.lock() {
                    Ok(g) => g,
                    Err(_) => break,
                };
                match guard.recv() {
                    Ok(req) => req,
                    Err(_) => break,
                }
            };
            let result = Self::parse_one(&mut parser, request);
            if reply.send(result).is_err() {
                tracing::warn!(worker = id, "parse caller went away before the reply");
            }
        }
        tracing::debug!(worker = id, "parser worker shutting down");
    }

    fn parse_one(parser: &mut Parser, request: ParseRequest) -> Result<ParseOutput, ExtractError> {
        parser
            .set_language(&request.lang.grammar())
            .map_err(|e| ExtractError::Grammar(e.to_string()))?;
        match parser.parse(&request.content, None) {
            Some(tree) => Ok(ParseOutput {
                tree,
                content: request.content,
                path: request.path,
            }),
            None => Err(ExtractError::Parse {
                path: request.path,
                reason: "parser produced no tree".into(),
            }),
        }
    }

    /// Parse on a worker thread, blocking the caller until it completes.
    pub fn parse_blocking(&self, request: ParseRequest) -> Result<ParseOutput, ExtractError> {
        let (reply, rx) = mpsc::channel();
        self.sender
            .send(WorkerRequest { request, reply })
            .map_err(|_| ExtractError::PoolClosed)?;
        rx.recv().map_err(|_| ExtractError::PoolClosed)?
    }

    /// Async parse; the blocking wait runs on the runtime's blocking pool.
    pub async fn parse(&self, request: ParseRequest) -> Result<ParseOutput, ExtractError> {
        let sender = self.sender.clone();
        tokio::task::spawn_blocking(move || {
            let (reply, rx) = mpsc::channel();
            sender
                .send(WorkerRequest { request, reply })
                .map_err(|_| ExtractError::PoolClosed)?;
            rx.recv().map_err(|_| ExtractError::PoolClosed)?
        })
        .await
        .map_err(|e| ExtractError::Grammar(format!("parse task join error: {e}")))?
    }
}

impl Clone for ParserPool {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
