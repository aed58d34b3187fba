//! Scripted exchange for unit tests

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Cursor;

use coldstore_core::{ColdstoreError, ColdstoreResult};

use crate::request::{Method, Params};
use crate::transport::{Exchange, RawResponse, SignedRequest};

/// A request as the fake saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Params,
    pub headers: Params,
    pub body: Vec<u8>,
}

pub enum Reply {
    Status {
        status: u16,
        headers: Params,
        body: Vec<u8>,
    },
    Fail(ColdstoreError),
}

impl Reply {
    pub fn ok(status: u16) -> Self {
        Self::ok_with(status, &[], Vec::new())
    }

    pub fn ok_with(status: u16, headers: &[(&str, &str)], body: Vec<u8>) -> Self {
        Reply::Status {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
        }
    }

    pub fn error(status: u16, kind: &str, code: &str) -> Self {
        let body = format!(r#"{{"type":"{kind}","code":"{code}","message":"scripted"}}"#);
        Self::raw(status, body.into_bytes())
    }

    pub fn raw(status: u16, body: Vec<u8>) -> Self {
        Reply::Status {
            status,
            headers: Params::new(),
            body,
        }
    }

    pub fn connection(msg: &str) -> Self {
        Reply::Fail(ColdstoreError::Connection(msg.to_string()))
    }

    pub fn timeout() -> Self {
        Reply::Fail(ColdstoreError::Timeout("scripted".into()))
    }
}

/// Plays back a fixed list of replies and records every request
pub struct FakeExchange {
    script: RefCell<VecDeque<Reply>>,
    seen: RefCell<Vec<Recorded>>,
}

impl FakeExchange {
    pub fn new(script: Vec<Reply>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.seen.borrow().clone()
    }
}

impl Exchange for FakeExchange {
    fn host(&self) -> String {
        "glacier.us-east-1.amazonaws.com".into()
    }

    fn exchange(&self, request: &SignedRequest<'_>) -> ColdstoreResult<RawResponse> {
        self.seen.borrow_mut().push(Recorded {
            method: request.method,
            path: request.path.to_string(),
            query: request.query.clone(),
            headers: request.headers.clone(),
            body: request.body.to_vec(),
        });

        match self.script.borrow_mut().pop_front() {
            Some(Reply::Status {
                status,
                headers,
                body,
            }) => Ok(RawResponse {
                status,
                headers,
                body: Box::new(Cursor::new(body)),
            }),
            Some(Reply::Fail(e)) => Err(e),
            None => panic!("fake exchange script exhausted at {} {}", request.method, request.path),
        }
    }
}
