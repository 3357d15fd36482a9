//! The demo apps driven through an in-memory page.
use demo::apps;
use illuminati::prelude::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn mount(config: Config, app: impl FnOnce(&MemPage) -> ElementNode) -> (MemPage, Mount<MemPage>) {
    init_logging();
    let page = MemPage::with_target("app").unwrap();
    let tree = app(&page);
    let engine = Engine::new(page.clone(), config);
    let mount = attach(&engine, "#app", tree).unwrap();
    (page, mount)
}

fn html(page: &MemPage) -> String {
    page.inner_html("#app").unwrap()
}

#[test]
fn hello_world() {
    let (page, _mount) = mount(Config::default(), |_| apps::hello_world());
    assert_eq!(html(&page), "<h1>Hello, World!</h1>");
}

#[test]
fn counter() {
    let (page, _mount) = mount(Config::default(), apps::counter);
    let expect = |n: i32| {
        format!(r#"<div><div>{n}</div><button class="dec">-</button><button class="inc">+</button></div>"#)
    };
    assert_eq!(html(&page), expect(0));
    page.click(".inc").unwrap();
    assert_eq!(html(&page), expect(1));
    page.click(".inc").unwrap();
    assert_eq!(html(&page), expect(2));
    page.click(".dec").unwrap();
    assert_eq!(html(&page), expect(1));
}

#[test]
fn toggle_visibility() {
    let (page, _mount) = mount(Config::default(), apps::toggle_visibility);
    let hidden = r#"<div><button class="toggle">toggle</button></div>"#;
    assert_eq!(html(&page), hidden);
    page.click(".toggle").unwrap();
    assert_eq!(
        html(&page),
        r#"<div><button class="toggle">toggle</button><div>content</div></div>"#
    );
    page.click(".toggle").unwrap();
    assert_eq!(html(&page), hidden);
}

#[test]
fn dynamic_attribute() {
    let (page, _mount) = mount(Config::default(), apps::dynamic_attribute);
    let plain = r#"<div class="container"><button class="pressme">Press Me</button></div>"#;
    assert_eq!(html(&page), plain);
    page.click(".pressme").unwrap();
    assert_eq!(
        html(&page),
        r#"<div class="container highlighted"><button class="pressme">Press Me</button></div>"#
    );
    page.click(".pressme").unwrap();
    assert_eq!(html(&page), plain);
}

#[test]
fn two_elements_keep_their_place() {
    let (page, _mount) = mount(Config::default(), apps::two_elements);
    let content = || page.inner_html(".content").unwrap();
    assert_eq!(content(), "<div>1. one</div><div>2. two</div>");
    page.click("button.one").unwrap();
    assert_eq!(content(), "<div>2. two</div>");
    page.click("button.one").unwrap();
    assert_eq!(content(), "<div>1. one</div><div>2. two</div>");
    page.click("button.two").unwrap();
    assert_eq!(content(), "<div>1. one</div>");
}

#[test]
fn dynamic_collection_add_remove() {
    let (page, _mount) = mount(Config::default(), apps::dynamic_collection);
    let list = || page.inner_html("ul").unwrap();
    assert_eq!(list(), "<li>1</li><li>2</li><li>3</li>");
    let before = page.query_selector_all("li").unwrap();

    page.click(".b-32").unwrap();
    // retained items stay where they were
    assert_eq!(list(), "<li>2</li><li>3</li>");
    assert!(html(&page).contains("</button>3, 2<ul>"));
    let after = page.query_selector_all("li").unwrap();
    assert_eq!(after, before[1..].to_vec());

    page.click(".b-54321").unwrap();
    assert_eq!(list(), "<li>2</li><li>3</li><li>5</li><li>4</li><li>1</li>");
}

#[test]
fn dynamic_collection_reorder() {
    let config = Config::default().with_ordering(CollectionOrdering::Reorder);
    let (page, _mount) = mount(config, apps::dynamic_collection);
    let list = || page.inner_html("ul").unwrap();
    assert_eq!(list(), "<li>1</li><li>2</li><li>3</li>");
    let before = page.query_selector_all("li").unwrap();

    page.click(".b-32").unwrap();
    assert_eq!(list(), "<li>3</li><li>2</li>");
    let after = page.query_selector_all("li").unwrap();
    assert_eq!(after, vec![before[2].clone(), before[1].clone()]);

    page.click(".b-54321").unwrap();
    assert_eq!(list(), "<li>5</li><li>4</li><li>3</li><li>2</li><li>1</li>");
    page.click(".b-123").unwrap();
    assert_eq!(list(), "<li>1</li><li>2</li><li>3</li>");
}

#[test]
fn next_frame_waits_for_flush() {
    let config = Config::default().with_schedule(Schedule::NextFrame);
    init_logging();
    let page = MemPage::with_target("app").unwrap();
    let engine = Engine::new(page.clone(), config);
    let _mount = attach(&engine, "#app", apps::counter(&page)).unwrap();
    page.click(".inc").unwrap();
    page.click(".inc").unwrap();
    assert!(html(&page).contains("<div>0</div>"));
    engine.flush();
    assert!(html(&page).contains("<div>2</div>"));
}

#[test]
fn unmount_removes_listeners() {
    let (page, mount) = mount(Config::default(), apps::counter);
    assert_eq!(page.listener_count(), 2);
    mount.unmount();
    assert_eq!(page.listener_count(), 0);
    assert_eq!(html(&page), "");
}

#[test]
fn change_one_of_many() {
    let (page, _mount) = mount(Config::default(), |page| apps::change_one_of(page, 2_000));
    assert_eq!(page.listener_count(), 1);
    page.clear_journal();

    page.click("#7").unwrap();
    let writes = page
        .journal()
        .into_iter()
        .filter(|m| m.is_attribute_write())
        .collect::<Vec<_>>();
    assert_eq!(writes.len(), 1);
    assert_eq!(
        page.inner_html("#7").unwrap(),
        "select me",
    );
    let selected = page.query_selector_all(".selected").unwrap();
    assert_eq!(selected.len(), 1);

    page.click("#1999").unwrap();
    assert_eq!(page.query_selector_all("li.selected").unwrap().len(), 1);
    assert_eq!(page.journal().iter().filter(|m| m.is_attribute_write()).count(), 3);
}
