//! Recording fake of the NIFCLOUD API for handler tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use nifcloud_sdk::{Api, ClientError, ClientResult, Method, Params, Service};
use serde_json::{Value, json};

/// A call observed by the fake
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub service: Service,
    /// Query action, or `METHOD path` for REST calls
    pub action: String,
    pub params: Params,
    pub body: Option<String>,
}

impl Call {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Ok(Value),
    Err { status: u16, code: String },
}

/// Replies are queued per action; the last queued reply repeats.
/// Actions without replies answer an empty object.
#[derive(Default)]
pub struct FakeApi {
    calls: Mutex<Vec<Call>>,
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, action: &str, value: Value) -> &Self {
        self.push(action, Reply::Ok(value));
        self
    }

    pub fn fail(&self, action: &str, status: u16, code: &str) -> &Self {
        self.push(
            action,
            Reply::Err {
                status,
                code: code.to_string(),
            },
        );
        self
    }

    fn push(&self, action: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.action).collect()
    }

    /// Actions other than describes, in call order
    pub fn mutations(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter(|a| {
                !(a.starts_with("Describe")
                    || a.starts_with("NiftyDescribe")
                    || a.starts_with("GET "))
            })
            .collect()
    }

    /// Every call of `action`
    pub fn calls_of(&self, action: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.action == action)
            .collect()
    }

    /// First call of `action`
    pub fn call(&self, action: &str) -> Option<Call> {
        self.calls_of(action).into_iter().next()
    }

    fn answer(&self, call: Call) -> ClientResult<Value> {
        let action = call.action.clone();
        self.calls.lock().unwrap().push(call);

        let mut replies = self.replies.lock().unwrap();
        let reply = match replies.get_mut(&action) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match reply {
            Some(Reply::Ok(value)) => Ok(value),
            Some(Reply::Err { status, code }) => {
                Err(ClientError::api(status, code, format!("{} rejected", action)))
            }
            None => Ok(json!({})),
        }
    }
}

#[async_trait]
impl Api for FakeApi {
    async fn query(&self, service: Service, action: &str, params: &Params) -> ClientResult<Value> {
        self.answer(Call {
            service,
            action: action.to_string(),
            params: params.clone(),
            body: None,
        })
    }

    async fn rest(
        &self,
        service: Service,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> ClientResult<Value> {
        self.answer(Call {
            service,
            action: format!("{} {}", method, path),
            params: Params::new(),
            body,
        })
    }
}
