//! In-memory session service for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::client::{ClientError, SessionService, SessionSource};
use crate::session::{Context, Image, LaunchRequest, Session, SessionStatus};

pub fn session(id: &str, name: &str, session_type: &str, status: SessionStatus) -> Session {
    Session {
        id: id.to_string(),
        name: name.to_string(),
        session_type: session_type.to_string(),
        status,
        userid: Some("jdoe".to_string()),
        image: Some(format!("images.example.org/skaha/{}:1.0", session_type)),
        start_time: None,
        connect_url: Some(format!("https://sessions.example.org/{}/{}", session_type, id)),
    }
}

#[derive(Default)]
struct State {
    sessions: Vec<Session>,
    scripted: VecDeque<Vec<Session>>,
    list_calls: u32,
    fail_list_on: Option<(u32, u16)>,
    fail_create: Option<u16>,
    fail_delete: Option<u16>,
    fail_images: Option<u16>,
    created: Vec<LaunchRequest>,
    deleted: Vec<String>,
    images: Vec<Image>,
    context: Option<Context>,
}

/// Session service whose answers are set up by the test
#[derive(Clone, Default)]
pub struct MemoryService {
    state: Arc<Mutex<State>>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current list, returned once the script runs out
    pub fn set_sessions(&self, sessions: Vec<Session>) {
        self.state.lock().unwrap().sessions = sessions;
    }

    /// Lists returned by successive calls; the last one sticks
    pub fn script_lists(&self, lists: Vec<Vec<Session>>) {
        self.state.lock().unwrap().scripted = lists.into();
    }

    /// Answer the given (1-based) list call with an error status
    pub fn fail_list_on_call(&self, call: u32, status: u16) {
        self.state.lock().unwrap().fail_list_on = Some((call, status));
    }

    pub fn fail_create(&self, status: u16) {
        self.state.lock().unwrap().fail_create = Some(status);
    }

    pub fn fail_delete(&self, status: u16) {
        self.state.lock().unwrap().fail_delete = Some(status);
    }

    pub fn fail_images(&self, status: u16) {
        self.state.lock().unwrap().fail_images = Some(status);
    }

    pub fn set_images(&self, images: Vec<Image>) {
        self.state.lock().unwrap().images = images;
    }

    pub fn set_context(&self, context: Context) {
        self.state.lock().unwrap().context = Some(context);
    }

    pub fn list_calls(&self) -> u32 {
        self.state.lock().unwrap().list_calls
    }

    pub fn created(&self) -> Vec<LaunchRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }
}

fn status_error(status: u16) -> ClientError {
    ClientError::Status {
        status,
        message: String::new(),
    }
}

impl SessionSource for MemoryService {
    async fn list_sessions(&self) -> Result<Vec<Session>, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;

        if let Some((call, status)) = state.fail_list_on {
            if call == state.list_calls {
                return Err(status_error(status));
            }
        }
        if let Some(next) = state.scripted.pop_front() {
            state.sessions = next;
        }
        Ok(state.sessions.clone())
    }
}

impl SessionService for MemoryService {
    async fn create_session(&self, request: &LaunchRequest) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.fail_create {
            return Err(status_error(status));
        }
        state.created.push(request.clone());
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.fail_delete {
            return Err(status_error(status));
        }
        state.deleted.push(id.to_string());
        Ok(())
    }

    async fn list_images(&self, session_type: Option<&str>) -> Result<Vec<Image>, ClientError> {
        let state = self.state.lock().unwrap();
        if let Some(status) = state.fail_images {
            return Err(status_error(status));
        }
        Ok(state
            .images
            .iter()
            .filter(|i| session_type.is_none_or(|t| i.types.iter().any(|it| it == t)))
            .cloned()
            .collect())
    }

    async fn context(&self) -> Result<Context, ClientError> {
        let state = self.state.lock().unwrap();
        state.context.clone().ok_or_else(|| status_error(404))
    }
}
