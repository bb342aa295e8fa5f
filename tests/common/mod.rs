//! Shared fixtures for integration tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use cfgd::config::load_documents;
use cfgd::{AppState, HttpServer, SessionManager, TransactionManager};

/// Platform ports are keyed, reference the matching interface member,
/// and constrain breakout against existing interface members.
pub fn schema_doc() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "platform": {
                "type": "object",
                "properties": {
                    "port": {
                        "type": "object",
                        "patternProperties": {
                            "^eth-[0-9]+$": {
                                "type": "object",
                                "reference": "interface/ethernet/@",
                                "properties": {
                                    "breakout-mode": {
                                        "type": "string",
                                        "default": "none",
                                        "update-constraints":
                                            "if (xpath_value('platform/port/[@item]/breakout-mode') <> 'none') then must(count(xpath_all('interface/ethernet/[@item]')) == 0)"
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "interface": {
                "type": "object",
                "properties": {
                    "ethernet": {
                        "type": "object",
                        "update-depends": "platform/port",
                        "patternProperties": {
                            "^eth-[0-9]+$": {
                                "type": "object",
                                "properties": {
                                    "speed": { "type": "string" },
                                    "mtu": { "type": "integer" }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

pub fn config_doc() -> serde_json::Value {
    json!({
        "platform": {
            "port": { "eth-1": { "breakout-mode": "none" } }
        },
        "interface": {
            "ethernet": { "eth-1": { "speed": "100G", "mtu": 9100 } }
        }
    })
}

pub fn manager() -> Arc<TransactionManager> {
    Arc::new(TransactionManager::new(
        load_documents(config_doc(), schema_doc()).unwrap(),
    ))
}

#[allow(dead_code)]
pub fn app_state(session_timeout: Duration) -> AppState {
    let manager = manager();
    let sessions = Arc::new(SessionManager::new(Arc::clone(&manager), session_timeout));
    AppState { manager, sessions }
}

/// Serve the daemon's router on an ephemeral port and return its base
/// URL.
#[allow(dead_code)]
pub async fn start_daemon(session_timeout: Duration) -> String {
    let server = HttpServer::new(app_state(session_timeout), Duration::from_secs(5));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
