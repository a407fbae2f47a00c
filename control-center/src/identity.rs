use serde::Deserialize;
use std::path::PathBuf;
use std::sync::OnceLock;

const DEFAULT_PRODUCT_NAME: &str = "AI Defender";
const DEFAULT_SERVICE_NAME: &str = "AI_DEFENDER_AGENT";

// Identity of the agent this client controls. An optional `product.toml`
// next to the executable overrides the defaults field by field.
#[derive(Debug, Clone)]
pub struct ProductIdentity {
  pub name: String,
  pub service_name: String,
  pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
struct IdentityFile {
  #[serde(default)]
  name: Option<String>,

  #[serde(default)]
  service_name: Option<String>,

  #[serde(default)]
  version: Option<String>,
}

static PRODUCT: OnceLock<ProductIdentity> = OnceLock::new();

pub fn product() -> &'static ProductIdentity {
  PRODUCT.get_or_init(load)
}

fn defaults() -> ProductIdentity {
  ProductIdentity {
    name: DEFAULT_PRODUCT_NAME.to_string(),
    service_name: DEFAULT_SERVICE_NAME.to_string(),
    version: env!("CARGO_PKG_VERSION").to_string(),
  }
}

fn load() -> ProductIdentity {
  let Some(path) = descriptor_path() else {
    return defaults();
  };

  let raw = match std::fs::read_to_string(&path) {
    Ok(r) => r,
    Err(_) => return defaults(),
  };

  match toml::from_str::<IdentityFile>(&raw) {
    Ok(file) => apply(file, defaults()),
    Err(e) => {
      eprintln!(
        "invalid product descriptor at {} ({e}); using built-in identity",
        path.display()
      );
      defaults()
    }
  }
}

fn apply(file: IdentityFile, base: ProductIdentity) -> ProductIdentity {
  ProductIdentity {
    name: file.name.unwrap_or(base.name),
    service_name: file.service_name.unwrap_or(base.service_name),
    version: file.version.unwrap_or(base.version),
  }
}

fn descriptor_path() -> Option<PathBuf> {
  let exe = std::env::current_exe().ok()?;
  Some(exe.parent()?.join("product.toml"))
}
