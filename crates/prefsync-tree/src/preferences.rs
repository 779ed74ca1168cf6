use prefsync_core::{Scope, Synchronizer};

use crate::node::PrefsNode;

/// Entry point to the user and system preference trees.
///
/// Both trees share one [`Synchronizer`], so their writes are coalesced by
/// the same flush timer.
#[derive(Clone, Debug)]
pub struct Preferences {
    sync: Synchronizer,
    user: PrefsNode,
    system: PrefsNode,
}

impl Preferences {
    pub fn new(sync: Synchronizer) -> Self {
        let user = PrefsNode::root(&sync, Scope::User);
        let system = PrefsNode::root(&sync, Scope::System);
        Self { sync, user, system }
    }

    /// Root of the current user's tree.
    pub fn user_root(&self) -> PrefsNode {
        self.user.clone()
    }

    /// Root of the machine-wide tree.
    pub fn system_root(&self) -> PrefsNode {
        self.system.clone()
    }

    pub fn root(&self, scope: Scope) -> PrefsNode {
        match scope {
            Scope::User => self.user_root(),
            Scope::System => self.system_root(),
        }
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }
}
