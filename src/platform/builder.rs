// self
use crate::{
	_prelude::*,
	platform::{PlatformDescriptor, PlatformEndpoints},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum PlatformDescriptorError {
	/// A required endpoint was never set.
	#[error("Missing {endpoint} endpoint.")]
	MissingEndpoint {
		/// Which endpoint is missing.
		endpoint: &'static str,
	},
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Endpoint text could not be parsed.
	#[error("The {endpoint} endpoint is not a valid URL: {url}.")]
	InvalidUrl {
		/// Which endpoint failed to parse.
		endpoint: &'static str,
		/// Offending input.
		url: String,
	},
}

/// Builder for [`PlatformDescriptor`] values.
#[derive(Debug)]
pub struct PlatformDescriptorBuilder {
	/// Label for the descriptor being constructed.
	pub name: String,
	/// Platform-level token endpoint.
	pub component_token: Option<Url>,
	/// Per-account token endpoint.
	pub authorizer_token: Option<Url>,
	/// Account-info endpoint.
	pub authorizer_info: Option<Url>,
	/// Authorization-code exchange endpoint.
	pub query_auth: Option<Url>,
}
impl PlatformDescriptorBuilder {
	/// Creates a new builder seeded with the provided label.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			component_token: None,
			authorizer_token: None,
			authorizer_info: None,
			query_auth: None,
		}
	}

	/// Derives every endpoint from a base URL using the platform's standard path names.
	///
	/// A missing trailing slash is added so the paths nest under `base`.
	pub fn base_url(mut self, base: &str) -> Result<Self, PlatformDescriptorError> {
		let invalid = || PlatformDescriptorError::InvalidUrl { endpoint: "base", url: base.into() };
		let base = if base.ends_with('/') { base.to_owned() } else { format!("{base}/") };
		let base = Url::parse(&base).map_err(|_| invalid())?;
		let join = |path: &str| base.join(path).map_err(|_| invalid());

		self.component_token = Some(join("api_component_token")?);
		self.authorizer_token = Some(join("api_authorizer_token")?);
		self.authorizer_info = Some(join("api_get_authorizer_info")?);
		self.query_auth = Some(join("api_query_auth")?);

		Ok(self)
	}

	/// Sets the platform-level token endpoint.
	pub fn component_token_endpoint(mut self, url: Url) -> Self {
		self.component_token = Some(url);

		self
	}

	/// Sets the per-account token endpoint.
	pub fn authorizer_token_endpoint(mut self, url: Url) -> Self {
		self.authorizer_token = Some(url);

		self
	}

	/// Sets the account-info endpoint.
	pub fn authorizer_info_endpoint(mut self, url: Url) -> Self {
		self.authorizer_info = Some(url);

		self
	}

	/// Sets the authorization-code exchange endpoint.
	pub fn query_auth_endpoint(mut self, url: Url) -> Self {
		self.query_auth = Some(url);

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<PlatformDescriptor, PlatformDescriptorError> {
		let missing = |endpoint| PlatformDescriptorError::MissingEndpoint { endpoint };
		let endpoints = PlatformEndpoints {
			component_token: self.component_token.ok_or_else(|| missing("component_token"))?,
			authorizer_token: self.authorizer_token.ok_or_else(|| missing("authorizer_token"))?,
			authorizer_info: self.authorizer_info.ok_or_else(|| missing("authorizer_info"))?,
			query_auth: self.query_auth.ok_or_else(|| missing("query_auth"))?,
		};
		let descriptor = PlatformDescriptor { name: self.name, endpoints };

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl PlatformDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self) -> Result<(), PlatformDescriptorError> {
		validate_endpoint("component_token", &self.endpoints.component_token)?;
		validate_endpoint("authorizer_token", &self.endpoints.authorizer_token)?;
		validate_endpoint("authorizer_info", &self.endpoints.authorizer_info)?;
		validate_endpoint("query_auth", &self.endpoints.query_auth)?;

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), PlatformDescriptorError> {
	if url.scheme() != "https" {
		Err(PlatformDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}
