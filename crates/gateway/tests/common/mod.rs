#![allow(dead_code)]

use std::path::{Path, PathBuf};
use unrelated_tool_gateway::model::ApiConfiguration;
use unrelated_tool_gateway::registry::ConflictStrategy;
use unrelated_tool_gateway::settings::{ApiSettings, GatewaySettings, OutboundSettings};
use unrelated_tool_gateway::{Gateway, GatewayStores};
use unrelated_openapi_tools::{GenerationOptions, HashPolicy};

pub const PETSTORE: &str = r"
openapi: 3.0.3
info:
  title: Petstore
  version: 1.0.0
paths:
  /pets:
    get:
      operationId: listPets
      summary: List pets
      parameters:
        - name: limit
          in: query
          schema:
            type: integer
    post:
      operationId: createPet
      summary: Create a pet
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              properties:
                name:
                  type: string
  /pets/{id}:
    get:
      operationId: getPet
      summary: Get a pet
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: string
  /fail:
    get:
      operationId: alwaysFails
      summary: Always fails
";

pub fn write_spec(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write spec");
    path
}

pub fn api(id: &str, base_url: &str, spec: &Path) -> ApiSettings {
    ApiSettings {
        config: ApiConfiguration::new(id, base_url),
        spec: spec.display().to_string(),
        spec_hash: None,
        spec_hash_policy: HashPolicy::Warn,
        generation: GenerationOptions::default(),
        conflict_strategy: ConflictStrategy::Overwrite,
    }
}

/// Settings that allow loopback upstreams and fail fast.
pub fn settings(apis: Vec<ApiSettings>) -> GatewaySettings {
    let mut settings = GatewaySettings {
        outbound: OutboundSettings {
            allow_private_networks: true,
            ..OutboundSettings::default()
        },
        apis,
        ..GatewaySettings::default()
    };
    settings.resilience.retry_delay_ms = 10;
    settings
}

pub async fn gateway(settings: &GatewaySettings) -> Gateway {
    Gateway::build(settings, GatewayStores::in_memory())
        .await
        .expect("build gateway")
}
