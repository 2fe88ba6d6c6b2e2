// tests/classify_rules.rs
use news_relay::analyze::{Category, Classifier};

#[test]
fn builtin_rules_cover_each_category() {
    let c = Classifier::builtin();
    let cases = [
        ("Bank Negara keeps OPR at 2.75%", "", Category::Economy),
        ("Banjir di Kelantan", "Mangsa dipindahkan ke PPS.", Category::Disaster),
        ("Lee Zii Jia reaches semi final", "Badminton star advances.", Category::Sports),
        ("Xiaomi 15T launches in Malaysia", "", Category::Technology),
        ("Concert tickets sold out", "", Category::Entertainment),
        ("Penang bridge lane closure tonight", "", Category::General),
        ("吉隆坡股市收高", "", Category::Economy),
        ("柔佛水灾灾民增至五千人", "", Category::Disaster),
    ];
    for (title, text, want) in cases {
        assert_eq!(c.classify(title, text), want, "{title}");
    }
}

#[test]
fn short_keywords_match_whole_words_only() {
    let c = Classifier::builtin();
    // "tax" must not fire inside "taxi"
    assert_eq!(c.classify("Taxi drivers protest at KLIA", ""), Category::General);
    assert_eq!(c.classify("New tax on sugary drinks", ""), Category::Economy);
}

#[test]
fn earlier_rules_win() {
    let c = Classifier::builtin();
    // both an economy and a technology keyword
    assert_eq!(c.classify("Nvidia posts record quarterly results", ""), Category::Economy);
}

#[test]
fn custom_rules_load_from_toml() {
    let c = Classifier::from_toml_str(
        r#"
        [[rules]]
        category = "sports"
        keywords = ["sepak takraw", "羽球"]
        "#,
    )
    .unwrap();
    assert_eq!(c.classify("Sepak Takraw final tonight", ""), Category::Sports);
    assert_eq!(c.classify("Xiaomi 15T", ""), Category::General);
    assert_eq!(Category::Sports.label(), "体育");
    assert_eq!(Category::General.label(), "综合");
}
