use std::sync::Arc;

use crate::{auth::Verifier, config::Config, store::Store};

pub struct State<S, V> {
    pub config: Config,
    pub store: S,
    pub verifier: V,
}

impl<S: Store, V: Verifier> State<S, V> {
    pub fn new(config: Config, store: S, verifier: V) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            verifier,
        })
    }
}
