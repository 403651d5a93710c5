//! WebSocket Real-Time Streaming
//!
//! Pushes feed updates, notifications and health signals to connected
//! dashboards.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Manages all active connections and subscriptions
//! - **Handler**: Handles WebSocket upgrade and message processing
//! - **Messages**: Defines client and server message formats
//!
//! ## Topics
//!
//! - `feeds.*` - Every feed update
//! - `feeds.{name}` - One feed (`reading`, `alerts`, `system`,
//!   `notification`, `history`)
//! - `notifications` - Notifications to show and dismiss
//! - `health` - Device/client status divergence
//!
//! ## Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/ws');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'subscribe', topics: ['feeds.*', 'notifications']}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'notification') {
//!     // show it, then report clicks:
//!     ws.send(JSON.stringify({type: 'notification_clicked', tag: msg.notification.tag}));
//!   }
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{ConnectionHub, ConnectionId, HubConfig, HubError};
pub use messages::{ClientMessage, ServerMessage, WsEvent};
