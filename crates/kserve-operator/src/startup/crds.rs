//! CRD installation utilities
//!
//! CRDs are generated from the Rust types and installed with server-side
//! apply, so the schema in the cluster always matches the running binary.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use kserve_common::crd::{InferenceConfig, InferenceRun};
use kserve_common::CONTROLLER_NAME;

/// CRD definition with name and resource
struct CrdDef {
    name: &'static str,
    crd: CustomResourceDefinition,
}

fn all_crds() -> Vec<CrdDef> {
    vec![
        CrdDef {
            name: "inferenceconfigs.ai.krateo.io",
            crd: InferenceConfig::crd(),
        },
        CrdDef {
            name: "inferenceruns.ai.krateo.io",
            crd: InferenceRun::crd(),
        },
    ]
}

/// Install or update every CRD the controller serves
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(CONTROLLER_NAME).force();

    for def in all_crds() {
        tracing::info!("Installing {} CRD...", def.name);
        crds.patch(def.name, &params, &Patch::Apply(&def.crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", def.name, e))?;
    }

    tracing::info!("CRDs installed/updated");
    Ok(())
}

/// All CRD manifests as a multi-document YAML stream
pub fn crd_yaml() -> anyhow::Result<String> {
    let docs = all_crds()
        .iter()
        .map(|def| {
            serde_yaml::to_string(&def.crd)
                .map_err(|e| anyhow::anyhow!("failed to serialize {} CRD: {}", def.name, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(docs.join("---\n"))
}
