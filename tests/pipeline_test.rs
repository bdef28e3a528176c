use std::fs;
use std::path::{
    Path,
    PathBuf,
};

use chrono::NaiveDate;
use tempfile::TempDir;
use versioner::context::{
    RunContext,
    RunOptions,
};
use versioner::error::exit_code_for;
use versioner::git::ScriptedHistory;
use versioner::orchestrator::run;

/// A source tree with a scripted history.
struct TestTree {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl TestTree {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    fn write(&self, relative: &str, content: &str) -> &Self {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root.join(relative)).unwrap()
    }

    /// Project, Dockerfile and package.json contents.
    fn snapshot(&self) -> (String, String, String) {
        (
            self.read("api/Api.csproj"),
            self.read("api/Dockerfile"),
            self.read("web/package.json"),
        )
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Two commits in `api`, one each in `web` and `py`.
    fn history(&self) -> ScriptedHistory {
        let root: &Path = &self.root;
        ScriptedHistory::new()
            .with_root(root)
            .commit(root.join("api"), "2025-10-13 11:00:00", 1)
            .commit(root.join("api"), "2025-10-14 09:30:00", 2)
            .commit(root.join("web"), "2025-08-05 15:20:00", 3)
            .commit(root.join("py"), "2025-10-01 07:45:00", 4)
    }

    fn context(&self, configure: impl FnOnce(&mut RunOptions)) -> RunContext {
        let mut options = RunOptions {
            working_folder: self.root.clone(),
            ..RunOptions::default()
        };
        configure(&mut options);
        let today = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();
        RunContext::new(&options.normalize(), Box::new(self.history()), today).unwrap()
    }

    fn populate(&self) {
        self.write(
            "api/Api.csproj",
            concat!(
                "<Project Sdk=\"Microsoft.NET.Sdk\">\n",
                "  <PropertyGroup Condition=\"'$(Configuration)'=='Release'\">\n",
                "    <Version>9.9.9</Version>\n",
                "    <Optimize>true</Optimize>\n",
                "  </PropertyGroup>\n",
                "  <PropertyGroup>\n",
                "  </PropertyGroup>\n",
                "</Project>",
            ),
        )
        .write("api/Dockerfile", "FROM mcr.microsoft.com/dotnet/aspnet:8.0\nCOPY . /app\n")
        .write("web/package.json", "{\n    \"name\": \"web\",\n    \"version\": \"0.3.0\"\n}\n")
        .write("py/pyproject.toml", "[project]\nname = \"py\"\nversion = \"0.1.0\"\n")
        .write("test/Ignored.csproj", "<Project Sdk=\"Microsoft.NET.Sdk\">\n</Project>")
        .write(".versionerignore", "# fixtures\ntest/**\n");
    }
}

#[test]
fn test_single_mode_pipeline() {
    let tree = TestTree::new();
    tree.populate();

    let mut ctx = tree.context(|o| o.store_version_file = true);
    let summary = run(&mut ctx).unwrap();

    assert_eq!(summary.build_label, "REV_20251014_0930_abc0002");
    assert_eq!(summary.artifact_version, "25.10.4");
    assert_eq!(summary.git_hash, "abc0002");
    assert_eq!(summary.artifacts_versioned, 4);

    let project = tree.read("api/Api.csproj");
    assert!(!project.contains("9.9.9"));
    assert!(project.contains("<Optimize>true</Optimize>"));
    assert!(project.contains("<Version>1.2510.287.2+abc0002</Version>"));
    assert!(project.contains("<AssemblyVersion>1.2510.287.2</AssemblyVersion>"));
    assert!(project.contains("<FileVersion>1.2510.287.2</FileVersion>"));
    assert!(tree.path("api/Api.csproj.bak").is_file());

    let dockerfile = tree.read("api/Dockerfile");
    assert!(dockerfile.starts_with("# Version: 1.2510.2\n"));
    assert!(
        dockerfile.contains("FROM mcr.microsoft.com/dotnet/aspnet:8.0\nARG VERSION=1.2510.2\n")
    );

    assert_eq!(
        tree.read("web/package.json"),
        "{\n    \"name\": \"web\",\n    \"version\": \"0.2508.1\"\n}\n"
    );
    assert_eq!(
        tree.read("py/pyproject.toml"),
        "[project]\nname = \"py\"\nversion = \"0.2510.1\"\n"
    );
    assert_eq!(
        tree.read("test/Ignored.csproj"),
        "<Project Sdk=\"Microsoft.NET.Sdk\">\n</Project>"
    );
    assert_eq!(tree.read("py/version.txt"), "0.2510.1");
    assert!(!tree.path("web/version.txt").exists());

    let lines = ctx.output.lines();
    assert_eq!(
        lines[0],
        "##teamcity[setParameter name='env.BuildLabel' value='REV_20251014_0930_abc0002']"
    );
    assert_eq!(
        lines[1],
        "##teamcity[setParameter name='env.ArtifactVersion' value='25.10.4']"
    );
    let web = "##teamcity[setParameter name='Version.web' value='0.2508.1']";
    assert!(lines.iter().any(|line| line == web));
    assert_eq!(ctx.output.value("env.DockerBuildLabel"), Some("1.2510.4"));
}

#[test]
fn test_single_mode_rerun_is_stable() {
    let tree = TestTree::new();
    tree.populate();

    run(&mut tree.context(|_| {})).unwrap();
    let first = tree.snapshot();
    run(&mut tree.context(|_| {})).unwrap();
    let second = tree.snapshot();

    assert_eq!(first.1, second.1);
    assert_eq!(first.2, second.2);
    // The description chains the previous one, everything else is unchanged.
    assert_eq!(
        first.0.replace("<Description>", "").lines().count(),
        second.0.replace("<Description>", "").lines().count()
    );
    assert!(second.0.contains("<AssemblyVersion>1.2510.287.2</AssemblyVersion>"));
}

#[test]
fn test_mono_repo_pipeline() {
    let tree = TestTree::new();
    tree.populate();
    tree.write(
        "Directory.Build.props",
        "<Project>\n  <PropertyGroup>\n    <Company>Acme</Company>\n  </PropertyGroup>\n</Project>",
    );
    let csproj_before = tree.read("api/Api.csproj");

    let mut ctx = tree.context(|o| {
        o.mono_repo = true;
        o.store_version_file = true;
    });
    let summary = run(&mut ctx).unwrap();

    // Directory.Build.props, Dockerfile, package.json, pyproject.toml
    assert_eq!(summary.artifacts_versioned, 4);
    assert_eq!(tree.read("api/Api.csproj"), csproj_before);

    let props = tree.read("Directory.Build.props");
    assert!(props.contains("<Company>Acme</Company>"));
    assert!(props.contains("<Version>25.10.4+abc0002</Version>"));
    assert!(props.contains("<AssemblyVersion>25.10.4</AssemblyVersion>"));
    assert!(props.contains("<Description>Version: REV_20251014_0930_abc0002</Description>"));

    assert!(tree.read("web/package.json").contains("\"version\": \"25.10.4\""));
    assert!(tree.read("py/pyproject.toml").contains("version = \"25.10.4\""));
    assert!(tree.read("api/Dockerfile").contains("ARG VERSION=25.10.4\n"));
    assert_eq!(tree.read("version.txt"), "25.10.4");
    assert!(!tree.path("api/version.txt").exists());
}

#[test]
fn test_kind_filter_limits_versioning() {
    let tree = TestTree::new();
    tree.populate();

    let mut ctx = tree.context(|o| o.version_items = Some("npm".to_string()));
    let summary = run(&mut ctx).unwrap();

    assert_eq!(summary.artifacts_versioned, 1);
    assert!(tree.read("py/pyproject.toml").contains("version = \"0.1.0\""));
    assert!(!tree.read("api/Dockerfile").contains("ARG VERSION"));
}

#[test]
fn test_fatal_exit_codes() {
    let tree = TestTree::new();
    tree.populate();
    tree.write("orphan/Orphan.csproj", "<Project Sdk=\"Microsoft.NET.Sdk\">\n</Project>");
    let err = run(&mut tree.context(|_| {})).unwrap_err();
    assert_eq!(exit_code_for(&err), 602);

    let empty = TestTree::new();
    let mut ctx = empty.context(|o| o.mono_repo = true);
    let err = run(&mut ctx).unwrap_err();
    assert_eq!(exit_code_for(&err), 500);
}
