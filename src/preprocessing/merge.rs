//! Project / organization merge
//!
//! Produces one row per project id carrying the raw project fields plus
//! organization aggregates (`org_count`, `organiser_country`, `SME`).

use super::{MERGED_SCHEMA, ORGANIZATION_SCHEMA, PROJECT_SCHEMA};
use crate::error::{HorizonError, Result};
use crate::utils::DataLoader;
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Load both raw tables and merge them.
///
/// Sources are read as text so that decimal-comma numbers and mixed date
/// formats survive until [`cast_types`](super::cast_types).
pub fn load_and_merge(
    project_path: impl AsRef<Path>,
    organization_path: impl AsRef<Path>,
    separator: u8,
) -> Result<DataFrame> {
    let loader = DataLoader::new().with_separator(separator).as_text();
    let projects = loader.load_auto(project_path.as_ref())?;
    let organizations = loader.load_auto(organization_path.as_ref())?;
    merge_sources(&projects, &organizations)
}

/// Organization aggregates for one project
#[derive(Debug, Default)]
struct OrgAggregate {
    members: HashSet<String>,
    coordinator_seen: bool,
    organiser_country: Option<String>,
    sme: Option<String>,
}

/// Raw project fields collapsed across duplicate rows
#[derive(Debug, Default)]
struct ProjectRow {
    ec_max_contribution: Option<String>,
    total_cost: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    funding_scheme: Option<String>,
}

fn fill_first(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none() {
        if let Some(v) = value {
            *slot = Some(v.clone());
        }
    }
}

/// Merge already-loaded project and organization tables.
///
/// Rows with a missing identifier on either side are ignored. Duplicate
/// project ids collapse to a single row where each field takes its first
/// non-missing value. Projects without organizations keep missing
/// aggregates.
pub fn merge_sources(projects: &DataFrame, organizations: &DataFrame) -> Result<DataFrame> {
    let projects = PROJECT_SCHEMA.select(projects)?;
    let organizations = ORGANIZATION_SCHEMA.select(organizations)?;

    let aggregates = aggregate_organizations(&organizations)?;

    let ids = identifier_values(projects.column("id")?.as_materialized_series())?;
    let ec = text_values(projects.column("ecMaxContribution")?.as_materialized_series())?;
    let cost = text_values(projects.column("totalCost")?.as_materialized_series())?;
    let start = text_values(projects.column("startDate")?.as_materialized_series())?;
    let end = text_values(projects.column("endDate")?.as_materialized_series())?;
    let scheme = text_values(projects.column("fundingScheme")?.as_materialized_series())?;

    let mut rows: BTreeMap<i64, ProjectRow> = BTreeMap::new();
    for (i, id) in ids.iter().enumerate() {
        let Some(id) = id else { continue };
        let row = rows.entry(*id).or_default();
        fill_first(&mut row.ec_max_contribution, &ec[i]);
        fill_first(&mut row.total_cost, &cost[i]);
        fill_first(&mut row.start_date, &start[i]);
        fill_first(&mut row.end_date, &end[i]);
        fill_first(&mut row.funding_scheme, &scheme[i]);
    }

    let n = rows.len();
    let mut out_id = Vec::with_capacity(n);
    let mut out_ec = Vec::with_capacity(n);
    let mut out_cost = Vec::with_capacity(n);
    let mut out_start = Vec::with_capacity(n);
    let mut out_end = Vec::with_capacity(n);
    let mut out_scheme = Vec::with_capacity(n);
    let mut out_sme: Vec<Option<String>> = Vec::with_capacity(n);
    let mut out_count: Vec<Option<i64>> = Vec::with_capacity(n);
    let mut out_country: Vec<Option<String>> = Vec::with_capacity(n);

    for (id, row) in rows {
        out_id.push(id);
        out_ec.push(row.ec_max_contribution);
        out_cost.push(row.total_cost);
        out_start.push(row.start_date);
        out_end.push(row.end_date);
        out_scheme.push(row.funding_scheme);

        match aggregates.get(&id) {
            Some(agg) => {
                out_sme.push(agg.sme.clone());
                out_count.push(Some(agg.members.len() as i64));
                out_country.push(agg.organiser_country.clone());
            }
            None => {
                out_sme.push(None);
                out_count.push(None);
                out_country.push(None);
            }
        }
    }

    let merged = DataFrame::new(vec![
        Series::new("id".into(), out_id).into(),
        Series::new("ecMaxContribution".into(), out_ec).into(),
        Series::new("totalCost".into(), out_cost).into(),
        Series::new("startDate".into(), out_start).into(),
        Series::new("endDate".into(), out_end).into(),
        Series::new("fundingScheme".into(), out_scheme).into(),
        Series::new("SME".into(), out_sme).into(),
        Series::new("org_count".into(), out_count).into(),
        Series::new("organiser_country".into(), out_country).into(),
    ])?;
    MERGED_SCHEMA.validate(&merged)?;

    info!(
        projects = projects.height(),
        organizations = organizations.height(),
        merged = merged.height(),
        "Merged project and organization records"
    );
    Ok(merged)
}

/// Organization rows visited per project with the coordinator (`order == 1`)
/// first, so that first-value aggregates favour it.
fn aggregate_organizations(organizations: &DataFrame) -> Result<HashMap<i64, OrgAggregate>> {
    let project_ids = identifier_values(organizations.column("projectID")?.as_materialized_series())?;
    let members = text_values(organizations.column("organisationID")?.as_materialized_series())?;
    let countries = text_values(organizations.column("country")?.as_materialized_series())?;
    let sme = text_values(organizations.column("SME")?.as_materialized_series())?;
    let order: Vec<Option<i64>> = text_values(organizations.column("order")?.as_materialized_series())?
        .into_iter()
        .map(|v| v.and_then(|s| super::parse_decimal(&s)).map(|x| x as i64))
        .collect();

    let mut visit: Vec<usize> = (0..organizations.height())
        .filter(|&i| project_ids[i].is_some())
        .collect();
    visit.sort_by_key(|&i| (project_ids[i], order[i].unwrap_or(i64::MAX)));

    let mut aggregates: HashMap<i64, OrgAggregate> = HashMap::new();
    for i in visit {
        let Some(project_id) = project_ids[i] else { continue };
        let agg = aggregates.entry(project_id).or_default();

        if let Some(member) = &members[i] {
            agg.members.insert(member.clone());
        }
        if order[i] == Some(1) && !agg.coordinator_seen {
            agg.coordinator_seen = true;
            agg.organiser_country = countries[i].clone();
        }
        fill_first(&mut agg.sme, &sme[i]);
    }

    debug!(projects_with_orgs = aggregates.len(), "Aggregated organizations");
    Ok(aggregates)
}

/// Read an identifier column as integers.
///
/// Integer columns pass through; text columns must parse as integers.
/// Any other representation means the two sources disagree on the key type.
pub(crate) fn identifier_values(s: &Series) -> Result<Vec<Option<i64>>> {
    match s.dtype() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Ok(s.cast(&DataType::Int64)?.i64()?.into_iter().collect()),
        DataType::String => s
            .str()?
            .into_iter()
            .map(|v| match v.map(str::trim) {
                None | Some("") => Ok(None),
                Some(text) => text.parse::<i64>().map(Some).map_err(|_| {
                    HorizonError::DataError(format!(
                        "inconsistent project identifier type: '{}' in column '{}' is not an integer",
                        text,
                        s.name()
                    ))
                }),
            })
            .collect(),
        other => Err(HorizonError::DataError(format!(
            "inconsistent project identifier type: column '{}' has dtype {}",
            s.name(),
            other
        ))),
    }
}

/// Stringify a column; blank text counts as missing
pub(crate) fn text_values(s: &Series) -> Result<Vec<Option<String>>> {
    let as_text = s.cast(&DataType::String)?;
    Ok(as_text
        .str()?
        .into_iter()
        .map(|v| {
            v.map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| t.to_string())
        })
        .collect())
}
