//! Cart synchronization state machine.
//!
//! [`SyncPhase`] replaces a loose pair of `is_loading` / `is_synced` flags
//! with one enum, so combinations that make no sense (synced while
//! anonymous, idle with requests outstanding) cannot be represented.

/// Where the cart stands relative to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    /// Guest cart, nothing happening.
    #[default]
    AnonIdle,
    /// Guest cart, a local mutation is being applied.
    AnonMutating,
    /// Signed in, but the snapshot has not been confirmed by the server.
    AuthUnsynced,
    /// Signed in with `in_flight` server requests outstanding.
    ///
    /// `synced` is whether the snapshot matched a server response before
    /// (or since) these requests started.
    AuthSyncing { synced: bool, in_flight: u32 },
    /// Signed in and the snapshot is the last server response.
    AuthSynced,
}

impl SyncPhase {
    /// The user signed in. A signed-in phase is left as is.
    #[must_use]
    pub const fn login(self) -> Self {
        match self {
            Self::AnonIdle | Self::AnonMutating => Self::AuthUnsynced,
            other => other,
        }
    }

    /// The user signed out. Outstanding requests are forgotten.
    #[must_use]
    pub const fn logout(self) -> Self {
        Self::AnonIdle
    }

    /// A server request was issued.
    #[must_use]
    pub const fn begin_remote(self) -> Self {
        match self {
            Self::AuthUnsynced => Self::AuthSyncing {
                synced: false,
                in_flight: 1,
            },
            Self::AuthSynced => Self::AuthSyncing {
                synced: true,
                in_flight: 1,
            },
            Self::AuthSyncing { synced, in_flight } => Self::AuthSyncing {
                synced,
                in_flight: in_flight.saturating_add(1),
            },
            anon => anon,
        }
    }

    /// A server request returned a snapshot that was applied.
    #[must_use]
    pub const fn remote_succeeded(self) -> Self {
        match self {
            Self::AuthSyncing { in_flight, .. } if in_flight > 1 => Self::AuthSyncing {
                synced: true,
                in_flight: in_flight - 1,
            },
            Self::AuthSyncing { .. } | Self::AuthUnsynced => Self::AuthSynced,
            other => other,
        }
    }

    /// A server request failed or returned nothing to apply.
    #[must_use]
    pub const fn remote_failed(self) -> Self {
        match self {
            Self::AuthSyncing { synced, in_flight } if in_flight > 1 => Self::AuthSyncing {
                synced,
                in_flight: in_flight - 1,
            },
            Self::AuthSyncing { synced: true, .. } => Self::AuthSynced,
            Self::AuthSyncing { synced: false, .. } => Self::AuthUnsynced,
            other => other,
        }
    }

    /// The snapshot no longer matches the server (e.g. after a local reset).
    #[must_use]
    pub const fn desynced(self) -> Self {
        match self {
            Self::AuthSynced => Self::AuthUnsynced,
            Self::AuthSyncing { in_flight, .. } => Self::AuthSyncing {
                synced: false,
                in_flight,
            },
            other => other,
        }
    }

    /// A guest mutation started.
    #[must_use]
    pub const fn begin_local(self) -> Self {
        match self {
            Self::AnonIdle => Self::AnonMutating,
            other => other,
        }
    }

    /// A guest mutation finished.
    #[must_use]
    pub const fn local_applied(self) -> Self {
        match self {
            Self::AnonMutating => Self::AnonIdle,
            other => other,
        }
    }

    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(
            self,
            Self::AuthUnsynced | Self::AuthSyncing { .. } | Self::AuthSynced
        )
    }

    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::AnonMutating | Self::AuthSyncing { .. })
    }

    #[must_use]
    pub const fn is_synced(self) -> bool {
        matches!(
            self,
            Self::AuthSynced | Self::AuthSyncing { synced: true, .. }
        )
    }

    /// Flag view of this phase.
    #[must_use]
    pub const fn state(self) -> SyncState {
        SyncState {
            is_loading: self.is_loading(),
            is_synced: self.is_synced(),
            is_authenticated: self.is_authenticated(),
        }
    }
}

/// Flag view of a [`SyncPhase`], for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct SyncState {
    /// A mutating or fetching operation is outstanding.
    pub is_loading: bool,
    /// The snapshot equals the last server response.
    pub is_synced: bool,
    /// The store is operating in the signed-in regime.
    pub is_authenticated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SyncPhase; 7] = [
        SyncPhase::AnonIdle,
        SyncPhase::AnonMutating,
        SyncPhase::AuthUnsynced,
        SyncPhase::AuthSyncing {
            synced: false,
            in_flight: 1,
        },
        SyncPhase::AuthSyncing {
            synced: true,
            in_flight: 2,
        },
        SyncPhase::AuthSynced,
        SyncPhase::AuthSyncing {
            synced: true,
            in_flight: 1,
        },
    ];

    #[test]
    fn test_flag_table() {
        let expect = |phase: SyncPhase, authenticated, loading, synced| {
            assert_eq!(
                phase.state(),
                SyncState {
                    is_loading: loading,
                    is_synced: synced,
                    is_authenticated: authenticated,
                },
                "{phase:?}"
            );
        };
        expect(SyncPhase::AnonIdle, false, false, false);
        expect(SyncPhase::AnonMutating, false, true, false);
        expect(SyncPhase::AuthUnsynced, true, false, false);
        expect(
            SyncPhase::AuthSyncing {
                synced: false,
                in_flight: 3,
            },
            true,
            true,
            false,
        );
        expect(SyncPhase::AuthSynced, true, false, true);
    }

    #[test]
    fn test_never_synced_while_anonymous() {
        for phase in ALL {
            for next in [
                phase.logout(),
                phase.logout().begin_local(),
                phase.logout().begin_remote(),
                phase.logout().remote_succeeded(),
                phase.logout().remote_failed(),
            ] {
                assert!(!next.is_synced(), "{phase:?} -> {next:?}");
            }
        }
    }

    #[test]
    fn test_login_from_anonymous() {
        assert_eq!(SyncPhase::AnonIdle.login(), SyncPhase::AuthUnsynced);
        assert_eq!(SyncPhase::AnonMutating.login(), SyncPhase::AuthUnsynced);
        assert_eq!(SyncPhase::AuthSynced.login(), SyncPhase::AuthSynced);
    }

    #[test]
    fn test_success_marks_synced() {
        let phase = SyncPhase::AuthUnsynced.begin_remote();
        assert_eq!(
            phase,
            SyncPhase::AuthSyncing {
                synced: false,
                in_flight: 1
            }
        );
        assert_eq!(phase.remote_succeeded(), SyncPhase::AuthSynced);
    }

    #[test]
    fn test_failure_keeps_prior_synced_flag() {
        let unsynced = SyncPhase::AuthUnsynced.begin_remote().remote_failed();
        assert_eq!(unsynced, SyncPhase::AuthUnsynced);

        let synced = SyncPhase::AuthSynced.begin_remote().remote_failed();
        assert_eq!(synced, SyncPhase::AuthSynced);
    }

    #[test]
    fn test_loading_until_last_request_settles() {
        let phase = SyncPhase::AuthUnsynced.begin_remote().begin_remote();
        let phase = phase.remote_succeeded();
        assert!(phase.is_loading());
        assert!(phase.is_synced());

        let phase = phase.remote_failed();
        assert_eq!(phase, SyncPhase::AuthSynced);
    }

    #[test]
    fn test_local_round_trip() {
        let phase = SyncPhase::AnonIdle.begin_local();
        assert!(phase.is_loading());
        assert_eq!(phase.local_applied(), SyncPhase::AnonIdle);
    }

    #[test]
    fn test_desynced() {
        assert_eq!(SyncPhase::AuthSynced.desynced(), SyncPhase::AuthUnsynced);
        assert!(
            !SyncPhase::AuthSynced
                .begin_remote()
                .desynced()
                .is_synced()
        );
        assert_eq!(SyncPhase::AnonIdle.desynced(), SyncPhase::AnonIdle);
    }
}
