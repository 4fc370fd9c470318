//! Shared application context.
//!
//! The original demo kept current mode, current persona, conversation history
//! and the response cache as module-level globals; here they live in one
//! explicit context object handed to every handler. Still one shared
//! conversation per process (single-session demo), but the ownership is
//! visible and each piece is individually locked for the multi-threaded
//! runtime.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::history::ConversationHistory;
use crate::modes::ModeStore;
use crate::persona::{generate_persona, session_seed, Persona};
use crate::providers::ChatProvider;
use crate::switch::ModeSwitchDetector;

/// Everything a session handler needs, shared behind an `Arc`.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<ModeStore>,
    pub provider: Arc<dyn ChatProvider>,
    pub detector: ModeSwitchDetector,
    /// Chat-channel conversation history.
    pub history: Mutex<ConversationHistory>,
    pub cache: Mutex<ResponseCache>,
    /// Current persona, tagged with the mode id it was generated for.
    persona: RwLock<(String, Persona)>,
    seed: u64,
}

impl AppContext {
    pub fn new(config: Config, store: Arc<ModeStore>, provider: Arc<dyn ChatProvider>) -> Self {
        let detector = ModeSwitchDetector::new(provider.clone(), store.clone());
        let history_cap = config.chat.history_cap;
        let cache = ResponseCache::new(
            config.chat.cache_capacity,
            Duration::from_secs(config.chat.cache_ttl_secs),
        );
        Self {
            config,
            store,
            provider,
            detector,
            history: Mutex::new(ConversationHistory::new(history_cap)),
            cache: Mutex::new(cache),
            persona: RwLock::new((String::new(), Persona::new())),
            seed: session_seed(),
        }
    }

    /// The persona for `mode_id`, generating it on first use.
    pub fn ensure_persona(&self, mode_id: &str) -> Persona {
        {
            let guard = self.persona.read().unwrap();
            if guard.0 == mode_id {
                return guard.1.clone();
            }
        }
        self.regenerate_persona(mode_id)
    }

    /// Force-regenerate the persona (called on every mode switch).
    pub fn regenerate_persona(&self, mode_id: &str) -> Persona {
        let persona = generate_persona(mode_id, self.seed);
        *self.persona.write().unwrap() = (mode_id.to_string(), persona.clone());
        persona
    }
}
