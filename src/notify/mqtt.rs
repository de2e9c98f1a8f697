//! MQTT notification transport.
//!
//! Publishes one JSON payload per alert to `<prefix>/<station>/alert` at
//! QoS 1, with a retained availability topic (`online`/`offline` plus Last
//! Will) so consumers can tell a quiet station from a dead one.

use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use rumqttc::Transport;
use serde::Serialize;

use crate::notify::{AlertNotification, NotificationTransport};
use crate::validate_station_id;

const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";

#[derive(Clone, Debug)]
pub struct MqttNotifierConfig {
    /// `host:port`, optionally prefixed with `mqtt://` or `mqtts://`.
    pub broker_addr: String,
    pub client_id: String,
    pub topic_prefix: String,
    pub station_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
struct MqttEndpoint {
    host: String,
    port: u16,
    use_tls: bool,
}

#[derive(Serialize)]
struct AlertPayload<'a> {
    station: &'a str,
    label: &'a str,
    track_id: i64,
    region_index: usize,
    snapshot: Option<&'a str>,
    timestamp: u64,
}

pub struct MqttNotifier {
    client: Client,
    connection_handle: Option<JoinHandle<()>>,
    alert_topic: String,
    availability_topic: String,
    station_id: String,
}

impl MqttNotifier {
    /// Connects and announces availability. The connection's event loop runs
    /// on a background thread until drop.
    pub fn connect(config: MqttNotifierConfig) -> Result<Self> {
        validate_station_id(&config.station_id)?;
        let endpoint = parse_mqtt_endpoint(&config.broker_addr)?;
        let alert_topic = format!("{}/{}/alert", config.topic_prefix, config.station_id);
        let availability_topic = format!("{}/{}/status", config.topic_prefix, config.station_id);

        let mut options = MqttOptions::new(&config.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some(user) = &config.username {
            options.set_credentials(user, config.password.as_deref().unwrap_or_default());
        }
        let will = rumqttc::v5::mqttbytes::v5::LastWill::new(
            &availability_topic,
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        );
        options.set_last_will(will);
        options.set_transport(if endpoint.use_tls {
            Transport::tls_with_default_config()
        } else {
            Transport::tcp()
        });

        let (client, connection) = Client::new(options, 10);
        let connection_handle = Some(spawn_drain_thread(connection));
        log::info!(
            "mqtt notifier: connected to {}:{} (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            config.username.is_some()
        );

        mqtt_publish_qos1(&client, &availability_topic, PAYLOAD_ONLINE.as_bytes(), true)?;

        Ok(Self {
            client,
            connection_handle,
            alert_topic,
            availability_topic,
            station_id: config.station_id,
        })
    }
}

impl NotificationTransport for MqttNotifier {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn send(&self, notification: &AlertNotification) -> Result<()> {
        let payload = AlertPayload {
            station: &self.station_id,
            label: &notification.label,
            track_id: notification.track_id,
            region_index: notification.region_index,
            snapshot: notification.snapshot.as_deref(),
            timestamp: notification.epoch_s,
        };
        let bytes = serde_json::to_vec(&payload)?;
        mqtt_publish_qos1(&self.client, &self.alert_topic, &bytes, false)
    }
}

impl Drop for MqttNotifier {
    fn drop(&mut self) {
        let _ = mqtt_publish_qos1(
            &self.client,
            &self.availability_topic,
            PAYLOAD_OFFLINE.as_bytes(),
            true,
        );
        let _ = self.client.disconnect();
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
    }
}

fn spawn_drain_thread(mut connection: Connection) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("mqtt notifier: connection error: {e}");
                    break;
                }
            }
        }
    })
}

fn mqtt_publish_qos1(client: &Client, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
    client.publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())?;
    Ok(())
}

fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("MQTT address must include a port: {}", addr))?
            .parse()
            .map_err(|_| anyhow!("invalid MQTT port in: {}", addr))?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("MQTT address must include a port: {}", addr))?;
    if host.is_empty() {
        return Err(anyhow!("invalid MQTT address: {}", addr));
    }
    let port = port
        .parse()
        .map_err(|_| anyhow!("invalid MQTT port in: {}", addr))?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_host_port() {
        let endpoint = parse_mqtt_endpoint("localhost:1883").unwrap();
        assert_eq!(
            endpoint,
            MqttEndpoint {
                host: "localhost".to_string(),
                port: 1883,
                use_tls: false,
            }
        );
    }

    #[test]
    fn parse_schemes() {
        assert!(!parse_mqtt_endpoint("mqtt://broker:1883").unwrap().use_tls);
        assert!(!parse_mqtt_endpoint("tcp://broker:1883").unwrap().use_tls);
        assert!(parse_mqtt_endpoint("mqtts://broker:8883").unwrap().use_tls);
        assert!(parse_mqtt_endpoint("ssl://broker:8883").unwrap().use_tls);
        assert!(parse_mqtt_endpoint("http://broker:1883").is_err());
    }

    #[test]
    fn parse_bracketed_ipv6() {
        let endpoint = parse_mqtt_endpoint("[::1]:1883").unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.port, 1883);
    }

    #[test]
    fn parse_rejects_missing_or_bad_port() {
        assert!(parse_mqtt_endpoint("broker").is_err());
        assert!(parse_mqtt_endpoint("broker:none").is_err());
        assert!(parse_mqtt_endpoint(":1883").is_err());
        assert!(parse_mqtt_endpoint("[::1]1883").is_err());
    }

    #[test]
    fn serialize_alert_payload() {
        let payload = AlertPayload {
            station: "front_door",
            label: "bicycle",
            track_id: 7,
            region_index: 1,
            snapshot: Some("output/alerts/alert_1755000000000.jpg"),
            timestamp: 1_755_000_000,
        };

        let json = serde_json::to_string(&payload).expect("serialize");
        assert!(json.contains("\"station\":\"front_door\""));
        assert!(json.contains("\"track_id\":7"));
        assert!(json.contains("alert_1755000000000.jpg"));
    }

    #[test]
    fn omitted_snapshot_serializes_null() {
        let payload = AlertPayload {
            station: "front_door",
            label: "bicycle",
            track_id: 7,
            region_index: 0,
            snapshot: None,
            timestamp: 1_755_000_000,
        };
        let json = serde_json::to_string(&payload).expect("serialize");
        assert!(json.contains("\"snapshot\":null"));
    }
}
