use dispatch_server::config::ServerConfig;
use dispatch_server::{build_handler, open_blob_store, session};
use dispatch_shared::codec::{self, FrameDecoder};
use dispatch_shared::protocol::{
    DroneLookup, LoadMedicine, MedicineDeclaration, RegisterDrone, UploadPart,
};
use dispatch_shared::{
    DroneModel, DroneState, ErrorKind, Request, RequestEnvelope, Response, ResponseEnvelope,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};

async fn start_server(config: ServerConfig) -> SocketAddr {
    let blob_store = open_blob_store(&config).await.unwrap();
    let handler = Arc::new(build_handler(&config, blob_store));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(session::serve(listener, handler));
    addr
}

struct TestClient {
    stream: TcpStream,
    decoder: FrameDecoder,
    next_id: u64,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            decoder: FrameDecoder::new(),
            next_id: 1,
        }
    }

    async fn recv(&mut self) -> ResponseEnvelope {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            if let Some(envelope) = self.decoder.decode_next().unwrap() {
                return envelope;
            }
            let n = timeout(Duration::from_secs(30), self.stream.read(&mut buf))
                .await
                .expect("server did not answer")
                .unwrap();
            assert!(n > 0, "server closed the connection");
            self.decoder.extend(&buf[..n]);
        }
    }

    async fn call(&mut self, request: Request) -> Response {
        let request_id = self.next_id;
        self.next_id += 1;

        let frame = codec::encode(&RequestEnvelope::new(request_id, request)).unwrap();
        self.stream.write_all(&frame).await.unwrap();

        let reply = self.recv().await;
        assert_eq!(reply.header.request_id, request_id);
        reply.response
    }
}

fn register(serial_number: &str, battery_percentage: i64) -> Request {
    Request::Register(RegisterDrone {
        serial_number: serial_number.into(),
        model: DroneModel::Heavyweight,
        weight_limit_grams: 250,
        battery_percentage,
    })
}

fn load(serial_number: &str, items: &[(&str, i64, &str)]) -> Request {
    let image = [0xffu8, 0xd8, 0xff, 0xe0];
    let items: Vec<_> = items
        .iter()
        .map(|&(name, weight_grams, code)| (name, weight_grams, code, &image[..]))
        .collect();
    load_with_images(serial_number, &items)
}

fn load_with_images(serial_number: &str, items: &[(&str, i64, &str, &[u8])]) -> Request {
    let mut parts = Vec::new();
    for (name, weight_grams, code, _) in items {
        let declaration = MedicineDeclaration {
            name: name.to_string(),
            weight_grams: *weight_grams,
            code: code.to_string(),
        };
        parts.push(UploadPart::declaration(&declaration).unwrap());
    }
    for (_, _, code, image) in items {
        parts.push(UploadPart::image(format!("{}.jpeg", code), image.to_vec()));
    }
    Request::LoadMedicine(LoadMedicine {
        serial_number: serial_number.into(),
        parts,
    })
}

fn get(serial_number: &str) -> Request {
    Request::GetDrone(DroneLookup {
        serial_number: serial_number.into(),
    })
}

fn error_kind(response: &Response) -> ErrorKind {
    match response {
        Response::Error(body) => body.kind,
        Response::Drone(view) => panic!("expected an error, got {:?}", view),
    }
}

#[tokio::test]
async fn test_register_load_and_get_over_tcp() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = TestClient::connect(addr).await;

    let Response::Drone(registered) = client.call(register("D1", 100)).await else {
        panic!("registration failed");
    };
    assert_eq!(registered.state, DroneState::Idle);

    let response = client
        .call(load("D1", &[("first", 10, "C1"), ("second", 15, "C2")]))
        .await;
    let Response::Drone(loaded) = response else {
        panic!("loading failed: {:?}", response);
    };
    assert_eq!(loaded.state, DroneState::Loaded);
    assert_eq!(loaded.medicines.len(), 2);

    let Response::Drone(fetched) = client.call(get("D1")).await else {
        panic!("lookup failed");
    };
    assert_eq!(fetched, loaded);
}

#[tokio::test]
async fn test_rejections_over_tcp() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = TestClient::connect(addr).await;

    client.call(register("D1", 10)).await;
    assert_eq!(
        error_kind(&client.call(register("D1", 10)).await),
        ErrorKind::DuplicateSerialNumber
    );
    assert_eq!(
        error_kind(&client.call(load("D1", &[("first", 10, "C1")])).await),
        ErrorKind::BatteryTooLow
    );
    assert_eq!(
        error_kind(&client.call(get("unknown")).await),
        ErrorKind::NotFound
    );

    let Response::Drone(view) = client.call(get("D1")).await else {
        panic!("lookup failed");
    };
    assert_eq!(view.state, DroneState::Idle);
    assert!(view.medicines.is_empty());
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = TestClient::connect(addr).await;

    let body = br#"{"header": {"requestId": 7}, "request": {"op": "fly"}}"#;
    let mut frame = (body.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(body);
    client.stream.write_all(&frame).await.unwrap();

    let reply = client.recv().await;
    assert_eq!(reply.header.request_id, 0);
    assert_eq!(error_kind(&reply.response), ErrorKind::MalformedRequest);

    // The same connection still answers well-formed requests
    assert!(matches!(
        client.call(register("D1", 100)).await,
        Response::Drone(_)
    ));
}

#[tokio::test]
async fn test_concurrent_loads_from_separate_connections() {
    let addr = start_server(ServerConfig::default()).await;
    let mut setup = TestClient::connect(addr).await;
    setup.call(register("D1", 100)).await;

    let mut tasks = Vec::new();
    for _ in 0..4 {
        tasks.push(tokio::spawn(async move {
            let mut client = TestClient::connect(addr).await;
            client.call(load("D1", &[("first", 10, "C1")])).await
        }));
    }

    let mut loaded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Response::Drone(view) => {
                assert_eq!(view.state, DroneState::Loaded);
                loaded += 1;
            }
            Response::Error(body) => assert_eq!(body.kind, ErrorKind::StateConflict),
        }
    }
    assert_eq!(loaded, 1);
}

#[tokio::test]
async fn test_filesystem_blob_store() {
    let tmp = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        blob_dir: Some(tmp.path().join("images")),
        ..ServerConfig::default()
    };
    let addr = start_server(config).await;
    let mut client = TestClient::connect(addr).await;

    client.call(register("D1", 100)).await;
    let response = client.call(load("D1", &[("first", 10, "C1")])).await;
    assert!(matches!(response, Response::Drone(_)));

    let stored = std::fs::read_dir(tmp.path().join("images")).unwrap().count();
    assert_eq!(stored, 1);
}

const MIB: usize = 1024 * 1024;

#[tokio::test]
async fn test_upload_within_default_limits_is_loaded() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = TestClient::connect(addr).await;
    client.call(register("D1", 100)).await;

    let image = vec![0xabu8; 4 * MIB + MIB / 2];
    let response = client
        .call(load_with_images(
            "D1",
            &[
                ("first", 10, "C1", &image[..]),
                ("second", 10, "C2", &image[..]),
                ("third", 10, "C3", &image[..]),
            ],
        ))
        .await;

    let Response::Drone(loaded) = response else {
        panic!("loading failed: {:?}", response);
    };
    assert_eq!(loaded.state, DroneState::Loaded);
    assert_eq!(loaded.medicines.len(), 3);
}

#[tokio::test]
async fn test_oversized_image_is_payload_too_large() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = TestClient::connect(addr).await;
    client.call(register("D1", 100)).await;

    let image = vec![0xabu8; 5 * MIB + 1];
    let response = client
        .call(load_with_images("D1", &[("first", 10, "C1", &image[..])]))
        .await;
    assert_eq!(error_kind(&response), ErrorKind::PayloadTooLarge);

    let Response::Drone(view) = client.call(get("D1")).await else {
        panic!("lookup failed");
    };
    assert_eq!(view.state, DroneState::Idle);
}

#[tokio::test]
async fn test_oversized_upload_is_payload_too_large() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = TestClient::connect(addr).await;
    client.call(register("D1", 100)).await;

    // Each image is within its limit, the sum is not
    let image = vec![0xabu8; 4 * MIB + MIB / 2];
    let items: Vec<(String, String)> = (1..=5)
        .map(|i| (format!("medicine_{}", i), format!("C{}", i)))
        .collect();
    let items: Vec<_> = items
        .iter()
        .map(|(name, code)| (name.as_str(), 10, code.as_str(), &image[..]))
        .collect();

    let response = client.call(load_with_images("D1", &items)).await;
    assert_eq!(error_kind(&response), ErrorKind::PayloadTooLarge);
}

#[tokio::test]
async fn test_oversized_frame_is_answered_before_close() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = TestClient::connect(addr).await;

    // Only the length prefix is sent; the server must not wait for the body
    client
        .stream
        .write_all(&(codec::MAX_MESSAGE_SIZE + 1).to_be_bytes())
        .await
        .unwrap();

    let reply = client.recv().await;
    assert_eq!(reply.header.request_id, 0);
    assert_eq!(error_kind(&reply.response), ErrorKind::PayloadTooLarge);

    let mut rest = Vec::new();
    let n = timeout(Duration::from_secs(5), client.stream.read_to_end(&mut rest))
        .await
        .expect("server kept the connection open")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_medicine_code_on_two_drones_over_tcp() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = TestClient::connect(addr).await;
    client.call(register("D1", 100)).await;
    client.call(register("D2", 100)).await;

    assert!(matches!(
        client.call(load("D1", &[("first", 10, "C1")])).await,
        Response::Drone(_)
    ));
    assert_eq!(
        error_kind(&client.call(load("D2", &[("first", 10, "C1")])).await),
        ErrorKind::MedicineAlreadyLoaded
    );
}
