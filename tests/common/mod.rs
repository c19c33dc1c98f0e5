//! Synthetic project/organization fixtures written as `;`-separated CSV

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const SCHEMES: [&str; 3] = ["HORIZON-CSA", "HORIZON-IA", "HORIZON-RIA"];
pub const COUNTRIES: [&str; 4] = ["DE", "ES", "FR", "IT"];

/// Contribution for project `i`; classes cycle 0, 1, 2
pub fn contribution(i: usize) -> f64 {
    let base = [1_000_000.0, 3_000_000.0, 6_000_000.0][i % 3];
    base + (i as f64) * 1_500.0
}

/// Decimal-comma rendering as found in the raw export
pub fn decimal_comma(v: f64) -> String {
    format!("{:.2}", v).replace('.', ",")
}

pub struct Fixture {
    pub project: PathBuf,
    pub organization: PathBuf,
    /// Projects that survive cleaning
    pub valid_projects: usize,
}

/// Write `n` regular projects plus three rows cleaning must drop:
/// a zero total cost, an unparseable start date and a project with no
/// organisations.
pub fn write_fixture(dir: &Path, n: usize) -> Fixture {
    let mut project = String::from("id;acronym;title;ecMaxContribution;totalCost;startDate;endDate;fundingScheme\n");
    let mut organization = String::from("projectID;organisationID;name;country;SME;order\n");

    for i in 0..n {
        let id = 100_000 + i;
        let ec = contribution(i);
        let month = 1 + i % 12;
        let years = 2 + i % 3;
        writeln!(
            project,
            "{};P{};Project {};{};{};2021-{:02}-01;{}-{:02}-01;{}",
            id,
            i,
            i,
            decimal_comma(ec),
            decimal_comma(ec * 1.25),
            month,
            2021 + years,
            month,
            SCHEMES[(i / 3) % 3]
        )
        .unwrap();

        let members = 1 + i % 4;
        for order in 1..=members {
            writeln!(
                organization,
                "{};{};Org {};{};{};{}",
                id,
                900_000 + i * 10 + order,
                order,
                COUNTRIES[(i + order) % 4],
                if (i + order) % 2 == 0 { "true" } else { "false" },
                order
            )
            .unwrap();
        }
    }

    // dropped: zero total cost
    writeln!(project, "1;Z;Zero;1000000;0;2021-01-01;2023-01-01;HORIZON-IA").unwrap();
    writeln!(organization, "1;1;Org;DE;true;1").unwrap();
    // dropped: bad start date
    writeln!(project, "2;D;Bad date;1000000;1200000;not a date;2023-01-01;HORIZON-IA").unwrap();
    writeln!(organization, "2;2;Org;FR;false;1").unwrap();
    // dropped: no organisations
    writeln!(project, "3;N;Orphan;1000000;1200000;2021-01-01;2023-01-01;HORIZON-IA").unwrap();

    let project_path = dir.join("project.csv");
    let organization_path = dir.join("organization.csv");
    std::fs::write(&project_path, project).unwrap();
    std::fs::write(&organization_path, organization).unwrap();

    Fixture {
        project: project_path,
        organization: organization_path,
        valid_projects: n,
    }
}
