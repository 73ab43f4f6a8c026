use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError}
};

use async_trait::async_trait;

use super::{CandidateSql, GenerationRequest, TextGenerator};
use crate::error::GenerationError;

/// Generator that replays a fixed list of candidates in order.
///
/// Used to push hand-written SQL through the same state machine as model
/// output. Running out of candidates is a generation failure, so a scripted
/// run never loops on its own.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    candidates: Mutex<VecDeque<String>>
}

impl ScriptedGenerator {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        Self {
            candidates: Mutex::new(candidates.into_iter().map(Into::into).collect())
        }
    }

    /// Candidates not yet handed out
    pub fn remaining(&self) -> usize {
        self.candidates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<CandidateSql, GenerationError> {
        let next = self
            .candidates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.map(CandidateSql::new).ok_or_else(|| {
            GenerationError::Transport(String::from("scripted generator has no candidates left"))
        })
    }
}
