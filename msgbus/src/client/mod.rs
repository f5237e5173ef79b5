//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Blocking client adapter and its configuration.

mod adapter;
mod config;
mod delivery;

pub use adapter::ClientAdapter;
pub use config::{
    ClientConfig, DEFAULT_AMQP_ENDPOINT, DEFAULT_MEMORY_ENDPOINT, DEFAULT_MQTT_ENDPOINT,
    ENV_CLIENT_NAME, ENV_ENDPOINT, ENV_TIMEOUT_MS,
};
pub use delivery::DeliveryState;
