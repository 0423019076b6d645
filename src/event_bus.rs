/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Synchronous dispatch of [events](crate::events) to user-registered handlers and the default loggers.

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

pub(crate) struct EventHandlers {
    pub(crate) generate_peer_directory_handlers: Vec<HandlerPtr<GeneratePeerDirectoryEvent>>,
    pub(crate) issue_identity_handlers: Vec<HandlerPtr<IssueIdentityEvent>>,
    pub(crate) custody_key_handlers: Vec<HandlerPtr<CustodyKeyEvent>>,
    pub(crate) materialize_config_handlers: Vec<HandlerPtr<MaterializeConfigEvent>>,
    pub(crate) distribute_bundle_handlers: Vec<HandlerPtr<DistributeBundleEvent>>,
    pub(crate) register_peers_handlers: Vec<HandlerPtr<RegisterPeersEvent>>,
}

impl EventHandlers {
    /// Collect the user-defined handlers, adding the default logger of every event type if `log_events` is
    /// set. Loggers run after the user-defined handler of the same event.
    pub(crate) fn new(
        log_events: bool,
        generate_peer_directory_handler: Option<HandlerPtr<GeneratePeerDirectoryEvent>>,
        issue_identity_handler: Option<HandlerPtr<IssueIdentityEvent>>,
        custody_key_handler: Option<HandlerPtr<CustodyKeyEvent>>,
        materialize_config_handler: Option<HandlerPtr<MaterializeConfigEvent>>,
        distribute_bundle_handler: Option<HandlerPtr<DistributeBundleEvent>>,
        register_peers_handler: Option<HandlerPtr<RegisterPeersEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            generate_peer_directory_handlers: with_logger(log_events, generate_peer_directory_handler),
            issue_identity_handlers: with_logger(log_events, issue_identity_handler),
            custody_key_handlers: with_logger(log_events, custody_key_handler),
            materialize_config_handlers: with_logger(log_events, materialize_config_handler),
            distribute_bundle_handlers: with_logger(log_events, distribute_bundle_handler),
            register_peers_handlers: with_logger(log_events, register_peers_handler),
        }
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::GeneratePeerDirectory(generate_peer_directory_event) => self
                .generate_peer_directory_handlers
                .iter()
                .for_each(|handler| handler(&generate_peer_directory_event)),

            Event::IssueIdentity(issue_identity_event) => self
                .issue_identity_handlers
                .iter()
                .for_each(|handler| handler(&issue_identity_event)),

            Event::CustodyKey(custody_key_event) => self
                .custody_key_handlers
                .iter()
                .for_each(|handler| handler(&custody_key_event)),

            Event::MaterializeConfig(materialize_config_event) => self
                .materialize_config_handlers
                .iter()
                .for_each(|handler| handler(&materialize_config_event)),

            Event::DistributeBundle(distribute_bundle_event) => self
                .distribute_bundle_handlers
                .iter()
                .for_each(|handler| handler(&distribute_bundle_event)),

            Event::RegisterPeers(register_peers_event) => self
                .register_peers_handlers
                .iter()
                .for_each(|handler| handler(&register_peers_event)),
        }
    }
}

fn with_logger<T: Logger>(log_events: bool, handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers: Vec<HandlerPtr<T>> = handler.into_iter().collect();
    if log_events {
        handlers.push(T::get_logger());
    }
    handlers
}
