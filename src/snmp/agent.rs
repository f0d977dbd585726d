use crate::{
    model::{
        event::{
            Event,
            EventSink,
        },
        job::DeviceStatus,
    },
    snmp::{
        ber::{
            encode_integer,
            encode_octet_string,
            encode_oid,
            encode_sequence,
            encoded_len,
            tag,
            tlv,
            SnmpQuery,
            MAX_LENGTH,
        },
        codec::SnmpCodec,
        DETECTED_ERROR_STATE,
        DEVICE_RUNNING,
        HR_DEVICE_STATUS,
        HR_PRINTER_DETECTED_ERROR_STATE,
        HR_PRINTER_STATUS,
    },
    store::JobStore,
};
use anyhow::Result;
use bytes::Bytes;
use futures::SinkExt;
use log::{
    debug,
    error,
    info,
    warn,
};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_stream::StreamExt;
use tokio_util::udp::UdpFramed;

/// Version field of every reply (SNMPv2c).
const REPLY_VERSION: u16 = 1;

/// GetResponse sent for every well-formed GetRequest, whatever it asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpReply {
    community: Bytes,
    request_id: Bytes,
    var_binds: Vec<(&'static [u32], u16)>,
}

impl SnmpReply {
    /// `None` when the echoed community and request id would push the reply
    /// past what a BER length field can carry.
    pub fn for_query(query: &SnmpQuery, status: DeviceStatus) -> Option<Self> {
        let reply = Self {
            community: query.community.clone(),
            request_id: query.request_id.clone(),
            var_binds: vec![
                (&HR_DEVICE_STATUS[..], DEVICE_RUNNING),
                (&HR_PRINTER_DETECTED_ERROR_STATE[..], DETECTED_ERROR_STATE),
                (&HR_PRINTER_STATUS[..], status.code()),
            ],
        };
        (reply.message_len() <= MAX_LENGTH).then_some(reply)
    }

    fn var_bind_list(&self) -> Vec<u8> {
        self.var_binds
            .iter()
            .flat_map(|(oid, value)| encode_sequence(&[encode_oid(oid), encode_integer(*value)].concat()))
            .collect()
    }

    /// Content length of the outer SEQUENCE. Every inner length is smaller.
    fn message_len(&self) -> usize {
        let pdu = encoded_len(self.request_id.len())
            + 2 * encoded_len(1)
            + encoded_len(self.var_bind_list().len());
        encoded_len(1) + encoded_len(self.community.len()) + encoded_len(pdu)
    }

    pub fn encode(&self) -> Vec<u8> {
        let var_binds = self.var_bind_list();

        let pdu = tlv(
            tag::GET_RESPONSE,
            &[
                // request id octets go back exactly as received
                tlv(tag::INTEGER, &self.request_id),
                encode_integer(0),
                encode_integer(0),
                encode_sequence(&var_binds),
            ]
            .concat(),
        );

        encode_sequence(
            &[
                encode_integer(REPLY_VERSION),
                encode_octet_string(&self.community),
                pdu,
            ]
            .concat(),
        )
    }
}

/// Answers status queries until the socket dies. Malformed datagrams are
/// logged and get no reply.
pub async fn run(socket: UdpSocket, store: Arc<JobStore>, events: EventSink) -> Result<()> {
    info!("SNMP agent listening on {}", socket.local_addr()?);
    let mut framed = UdpFramed::new(socket, SnmpCodec::default());

    while let Some(frame) = framed.next().await {
        let (request, peer) = match frame {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to receive SNMP datagram; error = {}", e);
                continue;
            }
        };

        events.notify(Event::SnmpQuery { peer });

        let query = match request {
            Ok(query) => query,
            Err(e) => {
                warn!("Dropping SNMP datagram from {}; error = {}", peer, e);
                continue;
            }
        };

        let status = store.status().await;
        debug!(
            "SNMP v{} query from {} [request_id={:02x?}, status={}]",
            query.version, peer, &query.request_id[..], status
        );

        let Some(reply) = SnmpReply::for_query(&query, status) else {
            warn!(
                "Dropping SNMP query from {}; reply would exceed {} bytes [community_len={}]",
                peer,
                MAX_LENGTH,
                query.community.len()
            );
            continue;
        };

        if let Err(e) = framed.send((reply, peer)).await {
            warn!("Failed to answer SNMP query from {}; error = {}", peer, e);
        }
    }

    Ok(())
}
