//! Conexión saliente resistente a cortes.
//!
//! Un fallo de envío cierra la conexión, reconecta (bloqueando el pipeline) y
//! reenvía una sola vez el mismo payload. Si el reenvío falla, el evento se
//! descarta y el proceso sigue vivo.

use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

/// Endpoint local por defecto del consumidor
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8884";

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no se pudo conectar a {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("fallo al enviar: {0}")]
    Send(String),

    #[error("la conexión está cerrada")]
    Closed,

    #[error("no hay conexión activa")]
    NotConnected,

    #[error("sin conexión tras {attempts} intentos")]
    GaveUp { attempts: u32 },
}

/// Conexión abierta capaz de enviar frames de texto
pub trait Connection {
    fn send_text(&mut self, payload: &str) -> Result<(), TransportError>;

    /// Cierra la conexión; los errores de cierre se ignoran
    fn close(&mut self);
}

/// Fábrica de conexiones hacia un endpoint fijo
pub trait Connector {
    type Conn: Connection;

    fn connect(&mut self) -> Result<Self::Conn, TransportError>;

    fn endpoint(&self) -> &str;
}

// ── WebSocket ──────────────────────────────────────────────

pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

pub struct WsConnection {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl Connector for WsConnector {
    type Conn = WsConnection;

    fn connect(&mut self) -> Result<WsConnection, TransportError> {
        let (socket, response) =
            tungstenite::connect(self.url.as_str()).map_err(|e| TransportError::Connect {
                endpoint: self.url.clone(),
                reason: e.to_string(),
            })?;
        debug!(status = %response.status(), "handshake WebSocket completado");
        Ok(WsConnection { socket })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

impl Connection for WsConnection {
    fn send_text(&mut self, payload: &str) -> Result<(), TransportError> {
        self.socket
            .send(Message::text(payload.to_owned()))
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    TransportError::Closed
                }
                other => TransportError::Send(other.to_string()),
            })
    }

    fn close(&mut self) {
        if let Err(e) = self.socket.close(None) {
            debug!(error = %e, "cierre WebSocket con error");
        }
        let _ = self.socket.flush();
    }
}

// ── Política de reintentos ─────────────────────────────────

/// Reintentos de conexión con espera fija más jitter opcional
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Jitter máximo sumado a `delay` (uniforme)
    pub jitter: Duration,
    /// `None`: reintentar indefinidamente
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            jitter: Duration::ZERO,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Política sin espera entre intentos
    pub fn immediate(max_attempts: Option<u32>) -> Self {
        Self {
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
            max_attempts,
        }
    }

    pub fn backoff(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.delay;
        }
        self.delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(false, |max| attempts >= max)
    }
}

/// Conecta reintentando según `policy`. Con la política por defecto solo
/// vuelve cuando la conexión se establece.
pub fn connect_with_retry<C: Connector>(
    connector: &mut C,
    policy: &RetryPolicy,
) -> Result<C::Conn, TransportError> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match connector.connect() {
            Ok(conn) => {
                info!(endpoint = connector.endpoint(), attempts, "✓ WebSocket conectado");
                return Ok(conn);
            }
            Err(e) => {
                if policy.exhausted(attempts) {
                    error!(endpoint = connector.endpoint(), attempts, error = %e, "✗ abandonando la conexión");
                    return Err(TransportError::GaveUp { attempts });
                }
                let wait = policy.backoff();
                warn!(
                    endpoint = connector.endpoint(),
                    attempt = attempts,
                    error = %e,
                    "✗ conexión fallida, reintentando en {:?}",
                    wait
                );
                if !wait.is_zero() {
                    thread::sleep(wait);
                }
            }
        }
    }
}

// ── Enlace resistente ──────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub failed_sends: u64,
    pub reconnects: u64,
    pub dropped: u64,
}

pub struct ResilientLink<C: Connector> {
    connector: C,
    policy: RetryPolicy,
    conn: Option<C::Conn>,
    stats: LinkStats,
}

impl<C: Connector> ResilientLink<C> {
    /// Establece la conexión inicial (reintentando según `policy`)
    pub fn open(mut connector: C, policy: RetryPolicy) -> Result<Self, TransportError> {
        let conn = connect_with_retry(&mut connector, &policy)?;
        Ok(Self {
            connector,
            policy,
            conn: Some(conn),
            stats: LinkStats::default(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    fn try_send(&mut self, payload: &str) -> Result<(), TransportError> {
        self.conn
            .as_mut()
            .ok_or(TransportError::NotConnected)?
            .send_text(payload)
    }

    fn discard_connection(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
    }

    /// Envía `payload`; ante un fallo reconecta y reenvía una vez.
    /// Devuelve `false` si el evento se descartó.
    pub fn send(&mut self, payload: &str) -> bool {
        match self.try_send(payload) {
            Ok(()) => {
                self.stats.sent += 1;
                return true;
            }
            Err(e) => {
                self.stats.failed_sends += 1;
                warn!(error = %e, "✗ fallo de envío WebSocket → reconectando");
            }
        }

        self.discard_connection();
        match connect_with_retry(&mut self.connector, &self.policy) {
            Ok(conn) => {
                self.conn = Some(conn);
                self.stats.reconnects += 1;
            }
            Err(e) => {
                error!(error = %e, "reconexión abandonada, evento descartado");
                self.stats.dropped += 1;
                return false;
            }
        }

        match self.try_send(payload) {
            Ok(()) => {
                self.stats.sent += 1;
                true
            }
            Err(e) => {
                self.stats.failed_sends += 1;
                self.stats.dropped += 1;
                warn!(error = %e, "✗ reenvío fallido, evento descartado");
                false
            }
        }
    }

    /// Cierre explícito al terminar el proceso
    pub fn close(&mut self) {
        if self.conn.is_some() {
            info!(endpoint = self.connector.endpoint(), "cerrando WebSocket");
        }
        self.discard_connection();
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockConnector;
    use super::*;

    fn open(connector: &MockConnector) -> ResilientLink<MockConnector> {
        ResilientLink::open(connector.clone(), RetryPolicy::immediate(None)).unwrap()
    }

    #[test]
    fn test_initial_connect_retries_until_success() {
        let connector = MockConnector::default();
        connector.fail_connects(3);
        let link = open(&connector);

        assert!(link.is_connected());
        let log = connector.log.borrow();
        assert_eq!(log.failed_connects, 3);
        assert_eq!(log.connects, 1);
    }

    #[test]
    fn test_bounded_policy_gives_up() {
        let connector = MockConnector::default();
        connector.fail_connects(5);
        let result = ResilientLink::open(connector.clone(), RetryPolicy::immediate(Some(2)));

        assert!(matches!(result, Err(TransportError::GaveUp { attempts: 2 })));
    }

    #[test]
    fn test_send_ok() {
        let connector = MockConnector::default();
        let mut link = open(&connector);

        assert!(link.send("{\"none\":{\"action\":\"none\"}}"));
        assert_eq!(connector.log.borrow().sent.len(), 1);
        assert_eq!(link.stats().sent, 1);
    }

    #[test]
    fn test_failed_send_reconnects_and_resends_same_payload() {
        let connector = MockConnector::default();
        let mut link = open(&connector);
        connector.script_sends(&[false]);
        connector.fail_connects(1);

        assert!(link.send("payload-1"));

        let log = connector.log.borrow();
        assert_eq!(log.sent, vec!["payload-1".to_string()]);
        assert_eq!(log.closes, 1);
        assert_eq!(log.connects, 2);
        assert_eq!(log.failed_connects, 1);
        assert_eq!(link.stats().reconnects, 1);
    }

    #[test]
    fn test_failed_resend_drops_event_without_panicking() {
        let connector = MockConnector::default();
        let mut link = open(&connector);
        connector.script_sends(&[false, false]);

        assert!(!link.send("payload-1"));
        {
            let log = connector.log.borrow();
            // Un solo ciclo cerrar + reconectar + reenviar
            assert_eq!(log.closes, 1);
            assert_eq!(log.connects, 2);
            assert!(log.sent.is_empty());
        }
        assert_eq!(link.stats().dropped, 1);

        // El siguiente evento sale con normalidad
        assert!(link.send("payload-2"));
        assert_eq!(connector.log.borrow().sent, vec!["payload-2".to_string()]);
    }

    #[test]
    fn test_close_closes_active_connection() {
        let connector = MockConnector::default();
        let mut link = open(&connector);
        link.close();

        assert!(!link.is_connected());
        assert_eq!(connector.log.borrow().closes, 1);
        link.close();
        assert_eq!(connector.log.borrow().closes, 1);
    }

    #[test]
    fn test_backoff_with_jitter_stays_in_range() {
        let policy = RetryPolicy {
            delay: Duration::from_millis(100),
            jitter: Duration::from_millis(20),
            max_attempts: None,
        };
        for _ in 0..50 {
            let wait = policy.backoff();
            assert!(wait >= Duration::from_millis(100));
            assert!(wait <= Duration::from_millis(120));
        }
        assert_eq!(RetryPolicy::default().backoff(), Duration::from_secs(2));
    }
}
