//! In-process stand-in for the Kubernetes API server, for unit tests.
//!
//! Serves just enough of the core API for [`Framework`](crate::Framework):
//! namespaces, the default service account, pods, pod logs and deletes.
//! Every request is recorded. Watch requests are held open without a
//! response, so a pod that never reaches a terminal phase stays pending.

use std::pin::pin;
use std::sync::{Arc, Mutex};

use http::{Method, Request, Response, StatusCode};
use k8s_openapi::api::core::v1::{Pod, PodStatus, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::client::Body;
use serde_json::{Value, json};
use tower_test::mock;

type Handle = mock::Handle<Request<Body>, Response<Body>>;
type Responder = mock::SendResponse<Response<Body>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub method: Method,
    pub path: String,
    pub query: String,
}

pub struct MockCluster {
    calls: Arc<Mutex<Vec<ApiCall>>>,
}

impl MockCluster {
    /// Start a server whose pods settle in `phase` and print `logs`
    pub fn start(phase: &str, logs: &str) -> (Client, MockCluster) {
        let (service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let server = Server {
            phase: phase.to_string(),
            logs: logs.to_string(),
            pods: Vec::new(),
            watches: Vec::new(),
            calls: calls.clone(),
        };
        tokio::spawn(server.serve(handle));
        (Client::new(service, "default"), MockCluster { calls })
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of `method` requests whose path ends with `suffix`
    pub fn count(&self, method: Method, suffix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path.ends_with(suffix))
            .count()
    }
}

struct Server {
    phase: String,
    logs: String,
    pods: Vec<Pod>,
    watches: Vec<Responder>,
    calls: Arc<Mutex<Vec<ApiCall>>>,
}

impl Server {
    async fn serve(mut self, handle: Handle) {
        let mut handle = pin!(handle);
        while let Some((request, send)) = handle.next_request().await {
            let method = request.method().clone();
            let path = request.uri().path().to_string();
            let query = request.uri().query().unwrap_or_default().to_string();
            let body = request.into_body().collect_bytes().await.unwrap_or_default();

            if let Ok(mut calls) = self.calls.lock() {
                calls.push(ApiCall {
                    method: method.clone(),
                    path: path.clone(),
                    query: query.clone(),
                });
            }

            if query.contains("watch=true") {
                self.watches.push(send);
                continue;
            }
            send.send_response(self.respond(&method, &path, &body));
        }
    }

    fn respond(&mut self, method: &Method, path: &str, body: &[u8]) -> Response<Body> {
        if *method == Method::DELETE {
            return json_response(
                StatusCode::OK,
                json!({"apiVersion": "v1", "kind": "Status", "metadata": {}, "status": "Success"}),
            );
        }

        if *method == Method::POST && path == "/api/v1/namespaces" {
            return Response::new(Body::from(body.to_vec()));
        }

        if *method == Method::POST && path.ends_with("/pods") {
            let Ok(mut pod) = serde_json::from_slice::<Pod>(body) else {
                return not_found();
            };
            pod.status = Some(PodStatus {
                phase: Some(self.phase.clone()),
                ..Default::default()
            });
            self.pods.push(pod.clone());
            return json_response(StatusCode::CREATED, to_value(&pod));
        }

        if *method == Method::GET && path.ends_with("/serviceaccounts") {
            let account = ServiceAccount {
                metadata: ObjectMeta {
                    name: Some("default".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            };
            return list_response("ServiceAccountList", vec![to_value(&account)]);
        }

        if *method == Method::GET && path.ends_with("/pods") {
            return list_response("PodList", self.pods.iter().map(to_value).collect());
        }

        if *method == Method::GET && path.ends_with("/log") {
            return Response::new(Body::from(self.logs.clone().into_bytes()));
        }

        not_found()
    }
}

fn to_value<T: serde::Serialize>(obj: &T) -> Value {
    serde_json::to_value(obj).unwrap_or(Value::Null)
}

fn list_response(kind: &str, items: Vec<Value>) -> Response<Body> {
    json_response(
        StatusCode::OK,
        json!({"apiVersion": "v1", "kind": kind, "metadata": {"resourceVersion": "1"}, "items": items}),
    )
}

fn not_found() -> Response<Body> {
    json_response(
        StatusCode::NOT_FOUND,
        json!({
            "apiVersion": "v1",
            "kind": "Status",
            "metadata": {},
            "status": "Failure",
            "reason": "NotFound",
            "message": "not found",
            "code": 404
        }),
    )
}

fn json_response(status: StatusCode, value: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(serde_json::to_vec(&value).unwrap_or_default()));
    *response.status_mut() = status;
    response
}
