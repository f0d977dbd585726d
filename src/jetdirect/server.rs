use crate::{
    model::event::{
        Event,
        EventSink,
    },
    store::JobStore,
};
use anyhow::Result;
use bytes::BytesMut;
use log::{
    error,
    info,
    warn,
};
use std::{
    net::SocketAddr,
    sync::Arc,
};
use tokio::net::{
    TcpListener,
    TcpStream,
};
use tokio_stream::StreamExt;
use tokio_util::codec::{
    BytesCodec,
    FramedRead,
};

/// One raw-print (port 9100) connection. There is no framing and nothing
/// is ever sent back: every byte goes to the active job.
struct JetDirect {
    store: Arc<JobStore>,
    events: EventSink,
    peer_addr: SocketAddr,
    received: usize,
    printing: bool,
}

impl JetDirect {
    fn new(store: Arc<JobStore>, events: EventSink, peer_addr: SocketAddr) -> Self {
        Self {
            store,
            events,
            peer_addr,
            received: 0,
            printing: false,
        }
    }

    async fn process(&mut self, stream: TcpStream) -> Result<()> {
        let mut frames = FramedRead::new(stream, BytesCodec::new());
        let result = self.drain(&mut frames).await;

        if self.printing {
            self.store.printing_finished().await;
        }
        info!(
            "JetDirect connection from {:?} closed [size={}]",
            self.peer_addr, self.received
        );
        result
    }

    async fn drain(&mut self, frames: &mut FramedRead<TcpStream, BytesCodec>) -> Result<()> {
        while let Some(chunk) = frames.next().await {
            let chunk: BytesMut = chunk?;
            self.store.append(&chunk).await?;
            self.received += chunk.len();

            if !self.printing {
                self.store.printing_started().await;
                self.printing = true;
            }

            self.events.notify(Event::PrinterData {
                peer: self.peer_addr,
                text: String::from_utf8_lossy(&chunk).into_owned(),
            });
        }

        Ok(())
    }
}

/// Accepts print connections for the life of the process, one task each.
pub async fn run(listener: TcpListener, store: Arc<JobStore>, events: EventSink) -> Result<()> {
    info!("JetDirect listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept JetDirect connection; error = {}", e);
                continue;
            }
        };
        info!("Got JetDirect connection from {:?}", peer_addr);

        let mut printer = JetDirect::new(store.clone(), events.clone(), peer_addr);
        tokio::spawn(async move {
            if let Err(e) = printer.process(stream).await {
                error!("failed to process JetDirect connection; error = {:#}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::job::DeviceStatus;
    use std::time::Duration;
    use tokio::{
        fs::{
            File,
            OpenOptions,
        },
        io::{
            AsyncReadExt,
            AsyncWriteExt,
        },
        sync::mpsc,
        time::{
            sleep,
            timeout,
        },
    };

    async fn start_listener() -> (
        SocketAddr,
        Arc<JobStore>,
        mpsc::Receiver<Event>,
        tempfile::TempDir,
    ) {
        let temp = tempfile::tempdir().unwrap();
        let (events, mut rx) = EventSink::channel(64);
        let store = Arc::new(JobStore::open(temp.path(), events.clone()).await.unwrap());
        assert!(matches!(rx.recv().await, Some(Event::NewJob { .. })));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run(listener, store.clone(), events));
        (addr, store, rx, temp)
    }

    async fn wait_for(store: &JobStore, status: DeviceStatus) {
        timeout(Duration::from_secs(5), async {
            while store.status().await != status {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("printer never became {}", status));
    }

    async fn wait_for_size(store: &JobStore, id: &str, size: usize) {
        timeout(Duration::from_secs(5), async {
            while store.read_job(id).await.unwrap().len() < size {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("job {} never reached {} bytes", id, size));
    }

    #[tokio::test]
    async fn stores_stream_and_tracks_status() {
        let (addr, store, mut rx, _temp) = start_listener().await;
        assert_eq!(store.status().await, DeviceStatus::Idle);

        let mut client = TcpStream::connect(addr).await.unwrap();
        let chunks: [&[u8]; 3] = [b"\x1b%-12345X@PJL JOB\r\n", b"%!PS\n\x00\xff", b"showpage\n"];

        client.write_all(chunks[0]).await.unwrap();
        wait_for(&store, DeviceStatus::Printing).await;
        match rx.recv().await {
            Some(Event::PrinterData { peer, text }) => {
                assert_eq!(peer, client.local_addr().unwrap());
                assert!(text.starts_with("\u{1b}%-12345X@PJL"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        for chunk in &chunks[1..] {
            client.write_all(chunk).await.unwrap();
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(store.status().await, DeviceStatus::Printing);
        drop(client);

        wait_for(&store, DeviceStatus::Idle).await;
        let id = store.current_job().await.id;
        assert_eq!(store.read_job(&id).await.unwrap(), chunks.concat());
    }

    #[tokio::test]
    async fn connection_without_data_never_prints() {
        let (addr, store, _rx, _temp) = start_listener().await;

        let client = TcpStream::connect(addr).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(store.status().await, DeviceStatus::Idle);
        drop(client);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(store.status().await, DeviceStatus::Idle);
    }

    #[tokio::test]
    async fn printing_until_last_connection_closes() {
        let (addr, store, _rx, _temp) = start_listener().await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        let mut second = TcpStream::connect(addr).await.unwrap();
        first.write_all(b"one").await.unwrap();
        second.write_all(b"two").await.unwrap();
        first.flush().await.unwrap();
        second.flush().await.unwrap();

        let id = store.current_job().await.id;
        wait_for_size(&store, &id, 6).await;
        wait_for(&store, DeviceStatus::Printing).await;

        drop(first);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(store.status().await, DeviceStatus::Printing);

        drop(second);
        wait_for(&store, DeviceStatus::Idle).await;
    }

    #[tokio::test]
    async fn new_job_redirects_following_data() {
        let (addr, store, _rx, _temp) = start_listener().await;
        let before = store.current_job().await.id;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"page one").await.unwrap();
        drop(client);
        wait_for_size(&store, &before, 8).await;
        wait_for(&store, DeviceStatus::Idle).await;

        let after = store.new_job().await.unwrap().id;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"page two").await.unwrap();
        drop(client);
        wait_for_size(&store, &after, 8).await;

        assert_eq!(store.read_job(&before).await.unwrap(), b"page one");
        assert_eq!(store.read_job(&after).await.unwrap(), b"page two");
    }

    #[tokio::test]
    async fn storage_failure_closes_only_that_connection() {
        let (addr, store, _rx, _temp) = start_listener().await;
        let job = store.current_job().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"good").await.unwrap();
        wait_for_size(&store, &job.id, 4).await;
        wait_for(&store, DeviceStatus::Printing).await;

        store
            .replace_active_file(File::open(&job.path).await.unwrap())
            .await;
        client.write_all(b"bad").await.unwrap();
        wait_for(&store, DeviceStatus::Idle).await;

        let mut buf = [0u8; 16];
        let closed = timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(closed, Ok(0) | Err(_)));

        let writable = OpenOptions::new().append(true).open(&job.path).await.unwrap();
        store.replace_active_file(writable).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        second.write_all(b"again").await.unwrap();
        wait_for_size(&store, &job.id, 9).await;
        drop(second);
        wait_for(&store, DeviceStatus::Idle).await;
        assert_eq!(store.read_job(&job.id).await.unwrap(), b"goodagain");
    }
}
