/// States of the connection state machine. The hierarchy is given by
/// [`State::parent`]; a message a state does not handle goes to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Default,
    Initial,
    SupplicantStarting,
    SupplicantStarted,
    ScanMode,
    ConnectMode,
    Disconnected,
    Connecting,
    L2Connected,
    ObtainingIp,
    Connected,
    Disconnecting,
    WpsRunning,
    SupplicantStopping,
    SoftAp,
}

impl State {
    pub fn parent(self) -> Option<State> {
        use State::*;
        match self {
            Default => None,
            Initial | SupplicantStarting | SupplicantStarted | SupplicantStopping | SoftAp => {
                Some(Default)
            }
            ScanMode | ConnectMode => Some(SupplicantStarted),
            Disconnected | Connecting | L2Connected | Disconnecting | WpsRunning => {
                Some(ConnectMode)
            }
            ObtainingIp | Connected => Some(L2Connected),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            State::Default => "DefaultState",
            State::Initial => "InitialState",
            State::SupplicantStarting => "SupplicantStartingState",
            State::SupplicantStarted => "SupplicantStartedState",
            State::ScanMode => "ScanModeState",
            State::ConnectMode => "ConnectModeState",
            State::Disconnected => "DisconnectedState",
            State::Connecting => "ConnectingState",
            State::L2Connected => "L2ConnectedState",
            State::ObtainingIp => "ObtainingIpState",
            State::Connected => "ConnectedState",
            State::Disconnecting => "DisconnectingState",
            State::WpsRunning => "WpsRunningState",
            State::SupplicantStopping => "SupplicantStoppingState",
            State::SoftAp => "SoftApState",
        }
    }

    /// This state followed by its ancestors up to the root.
    pub fn path_to_root(self) -> Vec<State> {
        let mut path = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent() {
            path.push(parent);
            current = parent;
        }
        path
    }

    pub fn is_within(self, ancestor: State) -> bool {
        self.path_to_root().contains(&ancestor)
    }
}
