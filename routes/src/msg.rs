// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Wire messages exchanged with the forwarding agent. Requests and replies
//! travel as length-prefixed JSON frames over a single stream connection.

use serde::{Deserialize, Serialize};

use crate::nexthop::MplsLabel;
use crate::prefix::Prefix;
use crate::route::{MplsRoute, UnicastRoute};

/// Client id this agent presents to the platform.
pub const FIB_CLIENT_ID: i16 = 786;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentRequest {
    AddUnicastRoutes {
        client_id: i16,
        routes: Vec<UnicastRoute>,
    },
    DeleteUnicastRoutes {
        client_id: i16,
        prefixes: Vec<Prefix>,
    },
    SyncFib {
        client_id: i16,
        routes: Vec<UnicastRoute>,
    },
    AddMplsRoutes {
        client_id: i16,
        routes: Vec<MplsRoute>,
    },
    DeleteMplsRoutes {
        client_id: i16,
        labels: Vec<MplsLabel>,
    },
    SyncMplsFib {
        client_id: i16,
        routes: Vec<MplsRoute>,
    },
    AliveSince,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentResponse {
    Ok,
    AliveSince(i64),
    Error(String),
}
