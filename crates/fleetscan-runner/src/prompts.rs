//! Per-operation prompts for the Claude worker.
//!
//! Each prompt ends with the report format the grammar in `fleetscan_core::grammar` reads.

use std::path::Path;

use fleetscan_core::OperationKind;

/// Build the prompt for one service.
pub fn build_prompt(
    kind: OperationKind,
    service: &str,
    organization: &str,
    workspace: &Path,
) -> String {
    let task = match kind {
        OperationKind::Fork => fork_task(service, organization),
        OperationKind::Status => status_task(service, organization),
        OperationKind::Test => test_task(service),
        OperationKind::Depends => depends_task(service),
        OperationKind::Vulns => vulns_task(service),
    };

    format!(
        r#"You are maintaining the `{service}` service repository of the `{organization}` organization.
Workspace: {workspace}

## Task
{task}

## Report format
Write your reasoning and tool output as you like. When you are finished, end with the report
below, exactly as shown, with real numbers. Do not put anything inside the blocks that is not
part of the format. Use `none` for a field you do not have.

{format}"#,
        service = service,
        organization = organization,
        workspace = workspace.display(),
        task = task,
        format = report_format(kind, service),
    )
}

fn fork_task(service: &str, organization: &str) -> String {
    format!(
        "Fork the upstream `{service}` repository into the `{organization}` organization if it is \
         not already forked, clone it into the workspace and make sure the `main`, `fork_upstream` \
         and `fork_integration` branches exist and track the upstream default branch."
    )
}

fn status_task(service: &str, organization: &str) -> String {
    format!(
        "Collect the current state of `{organization}/{service}`: open issues, open pull requests \
         and GitHub Actions workflow runs that failed on the default branch."
    )
}

fn test_task(service: &str) -> String {
    format!(
        "Run the Maven test suite of `{service}` (`mvn -B test`) across all modules and count the \
         passed, failed and skipped tests from the surefire reports. If a JaCoCo report exists, \
         read its line and branch coverage as whole percentages."
    )
}

fn depends_task(service: &str) -> String {
    format!(
        "Check the Maven dependencies of `{service}` for available updates \
         (`mvn versions:display-dependency-updates`). Classify every outdated dependency as a \
         major, minor or patch update and note the build module that declares it."
    )
}

fn vulns_task(service: &str) -> String {
    format!(
        "Scan `{service}` for known vulnerabilities in its dependencies (for example with \
         `trivy fs --scanners vuln`). Count findings per severity and per build module, and note \
         for each CVE the affected package, the installed version and the first fixed version."
    )
}

fn report_format(kind: OperationKind, service: &str) -> String {
    match kind {
        OperationKind::Fork => format!("✓ {service}: Analysis complete"),
        OperationKind::Status => format!(
            "✓ {service}: Analysis complete - <n> issues, <n> pull requests, <n> failed workflows"
        ),
        OperationKind::Test => format!(
            "✓ {service}: Analysis complete - <n> passed, <n> failed, <n> skipped tests, \
             <p>% line coverage, <p>% branch coverage\n\n\
             Leave out the coverage segments when no coverage report exists."
        ),
        OperationKind::Depends => format!(
            r#"✓ {service}: Analysis complete - <n> major, <n> minor, <n> patch updates
Total: <n> dependencies
Outdated: <n> dependencies

MODULE_BREAKDOWN
<module>|<major>|<minor>|<patch>
END_MODULE_BREAKDOWN

TOP_UPDATES
1. <groupId>:<artifactId>
   Current: <version>
   Patch: <version or none>
   Minor: <version or none>
   Major: <version or none>
   Module: <module or none>
END_TOP_UPDATES

List at most 10 updates, most important first."#
        ),
        OperationKind::Vulns => format!(
            r#"✓ {service}: Analysis complete - <n> critical, <n> high, <n> medium, <n> low vulnerabilities
Total: <n> dependencies
Affected: <n> dependencies

MODULE_BREAKDOWN
<module>|<critical>|<high>|<medium>|<low>
END_MODULE_BREAKDOWN

TOP_CVES
1. <CVE id>
   Severity: <Critical|High|Medium|Low>
   Package: <groupId>:<artifactId>
   Installed: <version>
   Fixed: <version or none>
END_TOP_CVES

List at most 10 CVEs, most severe first."#
        ),
    }
}
