use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use crate::alarm::AlarmService;

/// Collects every alarm raised through the [`AlarmService`] it creates.
#[derive(Clone, Debug, Default)]
pub struct AlarmRecorder {
    messages: Arc<Mutex<Vec<String>>>,
}

impl AlarmRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log-only alarm service that also records into this recorder.
    pub fn service(&self) -> AlarmService {
        let messages = Arc::clone(&self.messages);
        AlarmService::log_only().with_hook(move |msg| {
            let messages = Arc::clone(&messages);
            Box::pin(async move {
                messages.lock().expect("alarm recorder lock poisoned").push(msg);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("alarm recorder lock poisoned").clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages().iter().filter(|m| m.contains(needle)).count()
    }

    pub fn clear(&self) {
        self.messages.lock().expect("alarm recorder lock poisoned").clear();
    }
}
