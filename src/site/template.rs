//! Landing page template.

/// Handlebars source of `index.html`.
///
/// The inline script follows the same rules as [`super::resolve_route`].
pub const LANDING_PAGE: &str = r#"<!DOCTYPE html>
<html lang="{{default_language}}">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{title}}</title>
  <script>
    (function () {
      var languages = {{{languages_json}}};
      var autoDetect = {{auto_detect}};
      function match(candidate) {
        if (!candidate) { return null; }
        candidate = String(candidate).trim().toLowerCase();
        if (languages.indexOf(candidate) !== -1) { return candidate; }
        var primary = candidate.split(/[-_]/)[0];
        return languages.indexOf(primary) !== -1 ? primary : null;
      }
      var requested = match(new URLSearchParams(window.location.search).get("lang"));
      if (requested) {
        window.location.replace(requested + ".pdf");
        return;
      }
      if (autoDetect) {
        var preferred = navigator.languages || [navigator.language];
        for (var i = 0; i < preferred.length; i++) {
          var detected = match(preferred[i]);
          if (detected) {
            window.location.replace(detected + ".pdf");
            return;
          }
        }
      }
    })();
  </script>
  <style>
    body { font-family: system-ui, sans-serif; max-width: 32rem; margin: 4rem auto; padding: 0 1rem; color: #222; }
    h1 { font-weight: 600; }
    ul { list-style: none; padding: 0; }
    li { margin: 0.75rem 0; }
    a { color: {{accent}}; text-decoration: none; font-size: 1.2rem; }
    a:hover { text-decoration: underline; }
    footer { margin-top: 3rem; font-size: 0.8rem; color: #777; }
  </style>
</head>
<body>
  <h1>{{title}}</h1>
  <ul>
{{#each entries}}
    <li><a href="{{file}}" hreflang="{{language}}">{{label}}</a></li>
{{/each}}
  </ul>
{{#if updated}}
  <footer>Updated {{updated}}{{#if commit}} from {{commit}}{{/if}}</footer>
{{/if}}
</body>
</html>
"#;
