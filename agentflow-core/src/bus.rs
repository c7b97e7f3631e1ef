//! In-process message bus for agent coordination
//!
//! A single FIFO queue shared by all agents. Receivers remove the first
//! message that concerns them and leave everything else queued in order.
//! Delivery is at-most-once; there is no acknowledgement or redelivery.

use crate::config::BusConfig;
use crate::message::{AgentMessage, MessageType};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MessageBus {
    config: BusConfig,
    queue: Mutex<VecDeque<AgentMessage>>,
    history: Mutex<VecDeque<AgentMessage>>,
    /// subscriber -> publishers it listens to
    subscriptions: RwLock<HashMap<String, HashSet<String>>>,
}

impl MessageBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Enqueue a message and return its id
    pub fn send(
        &self,
        from_agent_id: &str,
        to_agent_id: Option<&str>,
        message_type: MessageType,
        payload: Value,
        correlation_id: Option<Uuid>,
    ) -> Uuid {
        let mut message = AgentMessage::new(
            from_agent_id,
            to_agent_id.map(str::to_string),
            message_type,
            payload,
        );
        message.correlation_id = correlation_id;
        self.publish(message)
    }

    /// Enqueue a prepared message
    pub fn publish(&self, message: AgentMessage) -> Uuid {
        let message_id = message.message_id;
        trace!(
            message_id = %message_id,
            from = %message.from_agent_id,
            to = ?message.to_agent_id,
            message_type = %message.message_type,
            "Message queued"
        );

        {
            let mut history = self.history.lock();
            history.push_back(message.clone());
            while history.len() > self.config.max_history {
                history.pop_front();
            }
        }
        let mut queue = self.queue.lock();
        queue.push_back(message);
        while queue.len() > self.config.max_pending {
            if let Some(dropped) = queue.pop_front() {
                warn!(
                    message_id = %dropped.message_id,
                    to = ?dropped.to_agent_id,
                    "Pending queue full, dropping undelivered message"
                );
            }
        }
        message_id
    }

    /// Take the next message for `agent_id`
    ///
    /// Without a timeout this is a single non-blocking poll. With a timeout the
    /// queue is polled every `poll_interval` until a message arrives or the
    /// deadline passes.
    pub async fn receive(&self, agent_id: &str, timeout: Option<Duration>) -> Option<AgentMessage> {
        let publishers = self.subscriptions_of(agent_id);
        self.poll_until(timeout, |message| {
            deliverable_to(message, agent_id, &publishers)
        })
        .await
    }

    /// Listen to every non-response message sent by `publisher`
    pub fn subscribe(&self, subscriber: &str, publisher: &str) {
        debug!(subscriber = %subscriber, publisher = %publisher, "Subscribed");
        self.subscriptions
            .write()
            .entry(subscriber.to_string())
            .or_default()
            .insert(publisher.to_string());
    }

    pub fn unsubscribe(&self, subscriber: &str, publisher: &str) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let Some(publishers) = subscriptions.get_mut(subscriber) else {
            return false;
        };
        let removed = publishers.remove(publisher);
        if publishers.is_empty() {
            subscriptions.remove(subscriber);
        }
        removed
    }

    /// Send a request and wait for the response carrying its correlation id
    ///
    /// Returns `None` when no matching response arrives in time. Responses
    /// with another correlation id stay queued.
    pub async fn request_response(
        &self,
        from_agent_id: &str,
        to_agent_id: &str,
        payload: Value,
        timeout: Duration,
    ) -> Option<AgentMessage> {
        let correlation_id = Uuid::new_v4();
        self.send(
            from_agent_id,
            Some(to_agent_id),
            MessageType::Request,
            payload,
            Some(correlation_id),
        );

        let response = self
            .poll_until(Some(timeout), |message| {
                message.message_type == MessageType::Response
                    && message.is_addressed_to(from_agent_id)
                    && message.correlation_id == Some(correlation_id)
            })
            .await;

        if response.is_none() {
            debug!(
                from = %from_agent_id,
                to = %to_agent_id,
                correlation_id = %correlation_id,
                "Request timed out without response"
            );
        }
        response
    }

    /// Answer `request` on behalf of `from_agent_id`
    pub fn respond(&self, request: &AgentMessage, from_agent_id: &str, payload: Value) -> Uuid {
        self.publish(request.reply(from_agent_id, payload))
    }

    /// Recent messages, oldest first, optionally only those sent by or addressed to an agent
    pub fn history(&self, agent_id: Option<&str>, limit: Option<usize>) -> Vec<AgentMessage> {
        let history = self.history.lock();
        let matching: Vec<&AgentMessage> = history
            .iter()
            .filter(|m| {
                agent_id.map_or(true, |id| m.from_agent_id == id || m.is_addressed_to(id))
            })
            .collect();
        let skip = limit.map_or(0, |limit| matching.len().saturating_sub(limit));
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Messages queued but not yet received
    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    fn subscriptions_of(&self, agent_id: &str) -> HashSet<String> {
        self.subscriptions
            .read()
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }

    fn take_first<F>(&self, matches: &F) -> Option<AgentMessage>
    where
        F: Fn(&AgentMessage) -> bool,
    {
        let mut queue = self.queue.lock();
        let position = queue.iter().position(matches)?;
        queue.remove(position)
    }

    async fn poll_until<F>(&self, timeout: Option<Duration>, matches: F) -> Option<AgentMessage>
    where
        F: Fn(&AgentMessage) -> bool,
    {
        if let Some(message) = self.take_first(&matches) {
            return Some(message);
        }
        let deadline = Instant::now() + timeout?;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep(self.config.poll_interval().min(deadline - now)).await;
            if let Some(message) = self.take_first(&matches) {
                return Some(message);
            }
        }
    }
}

fn deliverable_to(message: &AgentMessage, agent_id: &str, publishers: &HashSet<String>) -> bool {
    if message.is_addressed_to(agent_id) {
        return true;
    }
    if message.is_broadcast() && message.from_agent_id != agent_id {
        return true;
    }
    message.message_type != MessageType::Response
        && message.from_agent_id != agent_id
        && publishers.contains(&message.from_agent_id)
}
