use crate::peer::types::Candidate;
use std::collections::VecDeque;

/// Кандидаты, полученные до установки remote description
#[derive(Debug, Default)]
pub struct PendingCandidates {
    queue: VecDeque<Candidate>,
}

impl PendingCandidates {
    pub fn push(&mut self, candidate: Candidate) {
        tracing::debug!("Remote description not set yet, queuing candidate");
        self.queue.push_back(candidate);
    }

    pub fn pop(&mut self) -> Option<Candidate> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Счётчик типов локальных кандидатов
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateTally {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

impl CandidateTally {
    pub fn record(&mut self, candidate: &Candidate) {
        if candidate.candidate.contains("typ host") {
            self.host += 1;
        } else if candidate.candidate.contains("typ srflx") {
            self.srflx += 1;
        } else if candidate.candidate.contains("typ relay") {
            self.relay += 1;
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            "Candidate analysis: {} host, {} srflx, {} relay",
            self.host,
            self.srflx,
            self.relay
        );

        if self.relay == 0 {
            tracing::warn!("No TURN relay candidates found! Connection through NAT may fail.");
        }
    }
}
