use std::collections::HashMap;

use super::{PersistenceError, Persistent, decode};
use crate::action::DispatchableAction;
use crate::dispatcher::DispatcherScript;

pub type ActionLoader =
    Box<dyn Fn(&[u8]) -> Result<Box<dyn DispatchableAction>, PersistenceError> + Send + Sync>;

pub type ScriptLoader =
    Box<dyn Fn(&[u8]) -> Result<Box<dyn DispatcherScript>, PersistenceError> + Send + Sync>;

/// Maps persisted kind tags back to concrete scripts and actions.
///
/// Types that need runtime services after loading (a navigator, a sequence
/// player) register a custom loader closure that injects them.
#[derive(Default)]
pub struct Catalog {
    actions: HashMap<String, ActionLoader>,
    scripts: HashMap<String, ScriptLoader>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_action<T>(&mut self) -> &mut Self
    where
        T: DispatchableAction + Persistent,
    {
        self.register_action_with(T::KIND, |bytes| {
            let action: Box<dyn DispatchableAction> = Box::new(decode::<T>(T::KIND, bytes)?);
            Ok(action)
        })
    }

    pub fn register_action_with(
        &mut self,
        kind: &str,
        loader: impl Fn(&[u8]) -> Result<Box<dyn DispatchableAction>, PersistenceError>
        + Send
        + Sync
        + 'static,
    ) -> &mut Self {
        self.actions.insert(kind.to_owned(), Box::new(loader));
        self
    }

    pub fn register_script<T>(&mut self) -> &mut Self
    where
        T: DispatcherScript + Persistent,
    {
        self.register_script_with(T::KIND, |bytes| {
            let script: Box<dyn DispatcherScript> = Box::new(decode::<T>(T::KIND, bytes)?);
            Ok(script)
        })
    }

    pub fn register_script_with(
        &mut self,
        kind: &str,
        loader: impl Fn(&[u8]) -> Result<Box<dyn DispatcherScript>, PersistenceError>
        + Send
        + Sync
        + 'static,
    ) -> &mut Self {
        self.scripts.insert(kind.to_owned(), Box::new(loader));
        self
    }

    pub fn load_action(
        &self,
        kind: &str,
        payload: &[u8],
    ) -> Result<Box<dyn DispatchableAction>, PersistenceError> {
        let loader = self
            .actions
            .get(kind)
            .ok_or_else(|| PersistenceError::UnknownKind(kind.to_owned()))?;
        loader(payload)
    }

    pub fn load_script(
        &self,
        kind: &str,
        payload: &[u8],
    ) -> Result<Box<dyn DispatcherScript>, PersistenceError> {
        let loader = self
            .scripts
            .get(kind)
            .ok_or_else(|| PersistenceError::UnknownKind(kind.to_owned()))?;
        loader(payload)
    }

    pub fn knows_action(&self, kind: &str) -> bool {
        self.actions.contains_key(kind)
    }

    pub fn knows_script(&self, kind: &str) -> bool {
        self.scripts.contains_key(kind)
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut actions: Vec<_> = self.actions.keys().collect();
        let mut scripts: Vec<_> = self.scripts.keys().collect();
        actions.sort();
        scripts.sort();
        f.debug_struct("Catalog")
            .field("actions", &actions)
            .field("scripts", &scripts)
            .finish()
    }
}
