//! The provider-generic client: one region, its stations and the provider's variables.

use crate::error::MeteostationsError;
use crate::http::fetcher::HttpFetcher;
use crate::providers::{HasStationCatalog, HasVariableCatalog, Provider};
use crate::region::geocode::{Geocoder, Nominatim};
use crate::region::model::{Region, RegionSpec};
use crate::region::resolver::resolve_region;
use crate::settings::Settings;
use crate::stations::locate_station::{locate_stations, StationSet};
use crate::stations::spatial_join::SpatialJoin;
use crate::variables::catalog::{ResolvedVariable, VariableCatalog};
use crate::variables::token::{VariableCode, VariableToken};
use bon::bon;
use log::{debug, info};
use tokio::sync::OnceCell;

/// A client for one provider and one region.
///
/// The region is resolved when the client is built, so an unusable region
/// fails early. The station set and the variable catalog are fetched on first
/// use and kept for the lifetime of the client.
///
/// # Examples
///
/// ```rust,no_run
/// # use meteostations::{Client, MeteostationsError};
/// # use meteostations::providers::Agrometeo;
/// # async fn run() -> Result<(), MeteostationsError> {
/// let client = Client::builder()
///     .provider(Agrometeo::new())
///     .region("Canton de Vaud, Switzerland")
///     .build()
///     .await?;
/// let stations = client.stations().await?;
/// println!("{} stations in Vaud", stations.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client<P> {
    provider: P,
    fetcher: HttpFetcher,
    region: Region,
    spatial_join: SpatialJoin,
    stations: OnceCell<StationSet>,
    variables: OnceCell<VariableCatalog>,
}

#[bon]
impl<P: Provider> Client<P> {
    /// Builds a client, geocoding place names with Nominatim.
    ///
    /// # Arguments
    ///
    /// * `provider` - The weather API to talk to.
    /// * `region` - Anything convertible to a [`RegionSpec`]: a place name, a
    ///   path or URL to a GeoJSON or shapefile, a `[west, south, east, north]`
    ///   bounding box in the provider's CRS, geometries or a [`Region`].
    /// * `settings` - Optional. Defaults to [`Settings::default`].
    ///
    /// # Errors
    ///
    /// Returns [`MeteostationsError::Region`] if the region cannot be resolved
    /// and [`MeteostationsError::Fetch`] if the HTTP client cannot be set up.
    #[builder]
    pub async fn new(
        provider: P,
        #[builder(into)] region: RegionSpec,
        #[builder(default)] settings: Settings,
    ) -> Result<Self, MeteostationsError> {
        let geocoder = Nominatim::new(&settings)?;
        Self::with_geocoder(provider, region, settings, &geocoder).await
    }

    /// Like [`Client::builder`], with a custom [`Geocoder`] for place names.
    pub async fn with_geocoder<G: Geocoder>(
        provider: P,
        region: impl Into<RegionSpec>,
        settings: Settings,
        geocoder: &G,
    ) -> Result<Self, MeteostationsError> {
        let cache_dir = settings
            .cache_dir()
            .map_err(MeteostationsError::CacheDirResolution)?;
        debug!(
            "Creating {} client with cache at {}",
            provider.name(),
            cache_dir.display()
        );

        let fetcher = HttpFetcher::builder()
            .settings(settings.clone())
            .params(provider.request_params())
            .headers(provider.request_headers())
            .build()?;
        let region = resolve_region(region.into(), provider.crs(), &fetcher, geocoder).await?;
        info!(
            "Resolved {} region to {} geometries in {}",
            provider.name(),
            region.geometries().len(),
            region.crs()
        );

        Ok(Self {
            provider,
            fetcher,
            region,
            spatial_join: settings.spatial_join,
            stations: OnceCell::new(),
            variables: OnceCell::new(),
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The region, in the provider's CRS.
    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn fetcher(&self) -> &HttpFetcher {
        &self.fetcher
    }
}

impl<P: HasStationCatalog> Client<P> {
    /// The provider's stations inside the region, fetched once.
    pub async fn stations(&self) -> Result<&StationSet, MeteostationsError> {
        self.stations
            .get_or_try_init(|| async {
                let catalog = self.provider.station_catalog().load(&self.fetcher).await?;
                let stations = locate_stations(&catalog, &self.region, self.spatial_join)?;
                Ok::<_, MeteostationsError>(stations)
            })
            .await
    }
}

impl<P: HasVariableCatalog> Client<P> {
    /// The provider's variables, fetched once.
    pub async fn variables(&self) -> Result<&VariableCatalog, MeteostationsError> {
        self.variables
            .get_or_try_init(|| async {
                let catalog = self
                    .provider
                    .variable_catalog()
                    .load(self.provider.ecv(), &self.fetcher)
                    .await?;
                Ok::<_, MeteostationsError>(catalog)
            })
            .await
    }

    /// The native code for a variable code, display name or ECV.
    pub async fn resolve_variable_code(
        &self,
        token: impl Into<VariableToken>,
    ) -> Result<VariableCode, MeteostationsError> {
        Ok(self.variables().await?.resolve(token)?)
    }

    /// Resolves several variables, keeping their order and their text as labels.
    pub async fn resolve_variable_codes<I, T>(
        &self,
        tokens: I,
    ) -> Result<Vec<ResolvedVariable>, MeteostationsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<VariableToken>,
    {
        Ok(self.variables().await?.resolve_all(tokens)?)
    }
}
